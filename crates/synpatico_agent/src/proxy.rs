//! The interception proxy.
//!
//! One request flows RECV → DECODE_REQ? → FETCH → LEARN → ENCODE? →
//! EMIT, strictly serial. All protocol decisions live in
//! [`synpatico::negotiate`]; this module owns the transport: carrying
//! bodies to and from the upstream service and keeping the header
//! plumbing honest.

use std::sync::RwLock;

use async_trait::async_trait;
use synpatico::negotiate::{self, headers, AgentOutcome, HOP_BY_HOP_HEADERS};
use synpatico::{EndpointKey, Engine};
use thiserror::Error;

/// Request headers never forwarded upstream. The body may change
/// length after a packet decode, the connection is ours, and the
/// negotiation header is consumed here.
const REQUEST_STRIP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "accept-encoding",
    headers::ACCEPT_ID,
];

/// Failures that escape the negotiation fallbacks and become a
/// synthesized 500.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("invalid request method {0:?}")]
    InvalidMethod(String),
}

/// A request as the proxy core sees it, free of framework types.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A response as the proxy core sees it.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ProxyRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl ProxyResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}

fn strip_headers(headers: &mut Vec<(String, String)>, names: &[&str]) {
    headers.retain(|(key, _)| !names.iter().any(|name| key.eq_ignore_ascii_case(name)));
}

/// Transport seam to the upstream service. The binary plugs in
/// [`HttpUpstream`]; tests plug in a stub.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

/// reqwest-backed transport.
pub struct HttpUpstream {
    client: reqwest::Client,
    base: String,
}

impl HttpUpstream {
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let url = format!("{}{}", self.base, request.path_and_query);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ProxyError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        log::debug!("upstream {} -> {} ({} bytes)", url, status, body.len());

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

/// Shared proxy state: the engine behind a single-writer lock and the
/// upstream transport.
pub struct ProxyState {
    pub engine: RwLock<Engine>,
    pub upstream: Box<dyn UpstreamTransport>,
}

/// Run one request through the proxy. Total: internal failures come
/// back as the synthesized 500.
pub async fn run_proxy(state: &ProxyState, request: ProxyRequest) -> ProxyResponse {
    match run_proxy_inner(state, request).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("internal proxy error: {}", e);
            synthesized(500, negotiate::INTERNAL_ERROR_BODY)
        }
    }
}

async fn run_proxy_inner(
    state: &ProxyState,
    mut request: ProxyRequest,
) -> Result<ProxyResponse, ProxyError> {
    let endpoint = EndpointKey::new(&request.method, &request.path_and_query);
    let accept_id = request.header(headers::ACCEPT_ID).map(str::to_string);

    // RECV: an optimized request body must be decoded before it can be
    // forwarded
    let inbound_packet = request
        .header("content-type")
        .map(negotiate::is_packet_content_type)
        .unwrap_or(false);

    if inbound_packet {
        let engine = state.engine.read().expect("engine lock poisoned");

        match negotiate::decode_request_body(&engine, &request.body) {
            Ok(json) => {
                request.body = json;
                set_header(&mut request.headers, "content-type", negotiate::CONTENT_TYPE_JSON);
            }
            Err(e) => {
                log::info!("optimized request body rejected: {}", e);
                return Ok(synthesized(409, negotiate::STATE_CONFLICT_BODY));
            }
        }
    }

    // FETCH
    strip_headers(&mut request.headers, REQUEST_STRIP);
    let upstream = state.upstream.forward(request).await?;

    // LEARN + ENCODE on successful JSON bodies only; everything else
    // passes through with its original status
    let json_body = upstream
        .header("content-type")
        .map(negotiate::is_json_content_type)
        .unwrap_or(false);

    let outcome = if json_body && (200..300).contains(&upstream.status) {
        let mut engine = state.engine.write().expect("engine lock poisoned");
        negotiate::mediate_response(&mut engine, &endpoint, accept_id.as_deref(), &upstream.body)
    } else {
        AgentOutcome::Standard
    };

    // EMIT
    let ProxyResponse {
        status,
        mut headers,
        body,
    } = upstream;

    strip_headers(&mut headers, HOP_BY_HOP_HEADERS);
    strip_headers(&mut headers, &["content-length"]);
    set_header(&mut headers, headers::AGENT, negotiate::AGENT_HEADER_VALUE);

    Ok(match outcome {
        AgentOutcome::Optimized {
            body: packet,
            structure_id,
        } => {
            log::info!(
                "optimized {}: {} -> {} bytes",
                endpoint,
                body.len(),
                packet.len()
            );
            set_header(&mut headers, "content-type", negotiate::CONTENT_TYPE_PACKET);
            set_header(&mut headers, headers::STRUCTURE_ID, &structure_id);

            ProxyResponse {
                status,
                headers,
                body: packet,
            }
        }
        AgentOutcome::Standard => ProxyResponse {
            status,
            headers,
            body,
        },
    })
}

/// A response the agent makes up itself: 409 and 500 bodies.
fn synthesized(status: u16, body: &str) -> ProxyResponse {
    ProxyResponse {
        status,
        headers: vec![
            ("content-type".to_string(), negotiate::CONTENT_TYPE_JSON.to_string()),
            (headers::AGENT.to_string(), negotiate::AGENT_HEADER_VALUE.to_string()),
        ],
        body: body.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Upstream stub that replays a canned response and records what
    /// was forwarded to it.
    struct StubUpstream {
        response: ProxyResponse,
        seen: Arc<Mutex<Vec<ProxyRequest>>>,
    }

    #[async_trait]
    impl UpstreamTransport for StubUpstream {
        async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn wide_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "organization_identifier": "org-4481",
            "organization_display_name": "Weaver Industries",
            "primary_contact_email_address": "janet.weaver@reqres.in",
            "primary_contact_full_name": "Janet Weaver",
            "subscription_plan_identifier": "enterprise-annual",
            "subscription_renewal_timestamp": "2025-01-01T00:00:00Z",
            "billing_address_country_code": "SG",
            "billing_address_postal_code": "048624",
            "feature_flags_enabled_count": 23,
            "seats_licensed_total": 500,
            "seats_active_last_30_days": 412,
            "account_manager_employee_id": 90211
        }))
        .unwrap()
    }

    fn state_with_upstream(
        response: ProxyResponse,
    ) -> (Arc<ProxyState>, Arc<Mutex<Vec<ProxyRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(ProxyState {
            engine: RwLock::new(Engine::new()),
            upstream: Box::new(StubUpstream {
                response,
                seen: Arc::clone(&seen),
            }),
        });

        (state, seen)
    }

    fn json_upstream(body: Vec<u8>) -> ProxyResponse {
        ProxyResponse {
            status: 200,
            headers: vec![
                ("content-type".into(), "application/json".into()),
                ("content-encoding".into(), "identity".into()),
                ("x-request-id".into(), "req-1".into()),
            ],
            body,
        }
    }

    fn get(path: &str, headers: Vec<(String, String)>) -> ProxyRequest {
        ProxyRequest {
            method: "GET".into(),
            path_and_query: path.into(),
            headers,
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_cold_request_passes_through_and_learns() {
        let (state, _) = state_with_upstream(json_upstream(wide_body()));

        let response = run_proxy(&state, get("/users/2", vec![])).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header(headers::AGENT), Some("1"));
        assert_eq!(response.body, wide_body());

        let engine = state.engine.read().unwrap();
        assert_eq!(engine.structure_count(), 1);
        assert!(engine.known_id(&EndpointKey::new("GET", "/users/2")).is_some());
    }

    #[tokio::test]
    async fn test_warm_request_emits_packet() {
        let (state, _) = state_with_upstream(json_upstream(wide_body()));

        run_proxy(&state, get("/users/2", vec![])).await;
        let id = state
            .engine
            .read()
            .unwrap()
            .known_id(&EndpointKey::new("GET", "/users/2"))
            .cloned()
            .unwrap();

        let response = run_proxy(
            &state,
            get("/users/2", vec![(headers::ACCEPT_ID.into(), id.clone())]),
        )
        .await;

        assert_eq!(response.status, 200);
        assert_eq!(
            response.header("content-type"),
            Some(negotiate::CONTENT_TYPE_PACKET)
        );
        assert_eq!(response.header(headers::STRUCTURE_ID), Some(id.as_str()));
        assert!(response.body.len() < wide_body().len());
    }

    #[tokio::test]
    async fn test_drift_falls_back_to_json() {
        // upstream now serves a different structure than the one the
        // client negotiated
        let drifted = serde_json::to_vec(&serde_json::json!({ "v2": true })).unwrap();
        let (state, _) = state_with_upstream(json_upstream(drifted.clone()));

        // prime the cache with the original structure
        let negotiated = {
            let mut engine = state.engine.write().unwrap();
            let json: serde_json::Value = serde_json::from_slice(&wide_body()).unwrap();
            engine
                .learn(
                    Some(&EndpointKey::new("GET", "/users/2")),
                    &synpatico::envelope::from_wire(json),
                )
                .unwrap()
                .id
        };

        let response = run_proxy(
            &state,
            get("/users/2", vec![(headers::ACCEPT_ID.into(), negotiated)]),
        )
        .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.body, drifted);
    }

    #[tokio::test]
    async fn test_unknown_request_packet_is_409() {
        let (state, seen) = state_with_upstream(json_upstream(wide_body()));

        let mut request = get(
            "/users/2",
            vec![("content-type".into(), negotiate::CONTENT_TYPE_PACKET.into())],
        );
        request.method = "POST".into();
        request.body = br#"{
            "type": "values-only",
            "structureId": "L0:dead-L1:beef",
            "values": [1],
            "metadata": { "collisionCount": 0, "levels": 1 }
        }"#
        .to_vec();

        let response = run_proxy(&state, request).await;

        assert_eq!(response.status, 409);
        assert_eq!(response.body, negotiate::STATE_CONFLICT_BODY.as_bytes());
        // nothing was forwarded upstream
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_plumbing() {
        let (state, seen) = state_with_upstream(json_upstream(wide_body()));

        let request = get(
            "/users/2",
            vec![
                ("Host".into(), "proxy.local".into()),
                ("Accept-Encoding".into(), "gzip".into()),
                ("Authorization".into(), "Bearer token-1".into()),
                (headers::ACCEPT_ID.into(), "L0:1-L1:1".into()),
            ],
        );

        let response = run_proxy(&state, request).await;

        // negotiation and connection headers are consumed, the rest
        // forward
        let forwarded = &seen.lock().unwrap()[0];
        assert!(forwarded.header("host").is_none());
        assert!(forwarded.header("accept-encoding").is_none());
        assert!(forwarded.header(headers::ACCEPT_ID).is_none());
        assert_eq!(forwarded.header("authorization"), Some("Bearer token-1"));

        // hop-by-hop response headers are stripped, the rest survive
        assert!(response.header("content-encoding").is_none());
        assert_eq!(response.header("x-request-id"), Some("req-1"));
    }

    #[tokio::test]
    async fn test_upstream_status_passes_through() {
        let upstream = ProxyResponse {
            status: 404,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: b"no such user".to_vec(),
        };
        let (state, _) = state_with_upstream(upstream);

        let response = run_proxy(&state, get("/users/999", vec![])).await;

        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"no such user");
        // no learning happened
        assert_eq!(state.engine.read().unwrap().structure_count(), 0);
    }
}
