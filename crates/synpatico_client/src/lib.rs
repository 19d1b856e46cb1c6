//! The optimizing HTTP client middleware.
//!
//! [`SynpaticoClient`] wraps a [`reqwest::Client`] and runs the
//! client side of the negotiation on every request: offer a learned
//! structure id to origins known to host an agent, decode values-only
//! packets back into standard JSON before handing them to the caller,
//! and relearn on drift. Callers that never hit a synpatico agent see
//! plain passthrough behavior.

pub mod stats;

use std::collections::HashSet;
use std::sync::Mutex;

use synpatico::negotiate::{self, headers, ClientOutcome};
use synpatico::{EndpointKey, Engine, ProtocolError};
use thiserror::Error;
use url::Url;

use crate::stats::TransferStats;

/// Failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Protocol-level failure, e.g. an optimized response referencing
    /// a structure this client never learned.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A response after the middleware has run.
#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    /// True when the body arrived as a values-only packet and was
    /// reconstructed locally.
    pub optimized: bool,
    /// The structure id this response was learned under or decoded
    /// from, when there is one.
    pub structure_id: Option<String>,
    /// Standard JSON (or whatever the origin sent, when no
    /// negotiation happened).
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// HTTP client with the negotiation middleware attached.
///
/// All interior state is process-scoped and lock-protected; the
/// locks are never held across an await point.
pub struct SynpaticoClient {
    http: reqwest::Client,
    engine: Mutex<Engine>,
    capable_origins: Mutex<HashSet<String>>,
    stats: Mutex<TransferStats>,
}

impl Default for SynpaticoClient {
    fn default() -> Self {
        Self::with_http(reqwest::Client::new())
    }
}

impl SynpaticoClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a preconfigured [`reqwest::Client`] (timeouts, proxies,
    /// TLS settings stay the caller's business).
    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            engine: Mutex::new(Engine::new()),
            capable_origins: Mutex::new(HashSet::new()),
            stats: Mutex::new(TransferStats::default()),
        }
    }

    pub async fn get(&self, url: &str) -> Result<ClientResponse, ClientError> {
        self.request(reqwest::Method::GET, url).await
    }

    /// Perform a request with the negotiation middleware.
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> Result<ClientResponse, ClientError> {
        let parsed = Url::parse(url)?;
        let origin = parsed.origin().ascii_serialization();
        let endpoint = EndpointKey::new(method.as_str(), parsed.as_str());

        let offer = self.negotiation_offer(&origin, &endpoint);

        let mut builder = self.http.request(method.clone(), parsed.clone());
        if let Some(id) = &offer {
            log::debug!("offering {} for {}", id, endpoint);
            builder = builder.header(headers::ACCEPT_ID, id.as_str());
        }

        let response = builder.send().await?;

        // a conflict means the agent lost the state we negotiated
        // against; drop ours too and go again, plain
        if response.status().as_u16() == 409 && offer.is_some() {
            log::warn!("state conflict on {}, renegotiating", endpoint);
            self.stats.lock().expect("stats lock poisoned").record_conflict();
            self.engine
                .lock()
                .expect("engine lock poisoned")
                .forget_endpoint(&endpoint);

            let retry = self.http.request(method, parsed).send().await?;
            return self.finish(endpoint, origin, retry).await;
        }

        self.finish(endpoint, origin, response).await
    }

    /// The structure id to offer, if this origin is known to host an
    /// agent and the endpoint has been learned.
    fn negotiation_offer(&self, origin: &str, endpoint: &EndpointKey) -> Option<String> {
        if !self
            .capable_origins
            .lock()
            .expect("origin lock poisoned")
            .contains(origin)
        {
            return None;
        }

        self.engine
            .lock()
            .expect("engine lock poisoned")
            .known_id(endpoint)
            .cloned()
    }

    async fn finish(
        &self,
        endpoint: EndpointKey,
        origin: String,
        response: reqwest::Response,
    ) -> Result<ClientResponse, ClientError> {
        let status = response.status().as_u16();
        let agent_present = response.headers().contains_key(headers::AGENT);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let wire = response.bytes().await?.to_vec();
        let wire_len = wire.len();

        if agent_present {
            self.capable_origins
                .lock()
                .expect("origin lock poisoned")
                .insert(origin);
        }

        let outcome = {
            let mut engine = self.engine.lock().expect("engine lock poisoned");
            negotiate::interpret_response(
                &mut engine,
                &endpoint,
                agent_present,
                content_type.as_deref(),
                &wire,
            )?
        };

        let response = match outcome {
            ClientOutcome::Decoded { body, structure_id } => ClientResponse {
                status,
                optimized: true,
                structure_id: Some(structure_id),
                body,
            },
            ClientOutcome::Learned { structure_id } => ClientResponse {
                status,
                optimized: false,
                structure_id: Some(structure_id),
                body: wire,
            },
            ClientOutcome::Passthrough => ClientResponse {
                status,
                optimized: false,
                structure_id: None,
                body: wire,
            },
        };

        self.stats
            .lock()
            .expect("stats lock poisoned")
            .record(response.optimized, wire_len, response.body.len());

        Ok(response)
    }

    /// Forget every learned structure, endpoint and origin.
    pub fn clear_cache(&self) {
        self.engine
            .lock()
            .expect("engine lock poisoned")
            .reset_state();
        self.capable_origins
            .lock()
            .expect("origin lock poisoned")
            .clear();
    }

    /// Snapshot of the transfer accounting so far.
    pub fn stats(&self) -> TransferStats {
        self.stats.lock().expect("stats lock poisoned").clone()
    }
}
