mod args;
mod proxy;

use std::net::SocketAddrV4;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use clap::Parser;
use synpatico::negotiate;
use synpatico::{Engine, EngineOptions};

use crate::args::AgentArgs;
use crate::proxy::{run_proxy, HttpUpstream, ProxyRequest, ProxyState};

/// Upper bound on buffered request/response bodies.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[tokio::main]
async fn main() {
    match std::env::var("RUST_LOG") {
        Ok(_) => (),
        Err(_) => std::env::set_var("RUST_LOG", "INFO"),
    }

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").expect("RUST_LOG environment variable not set"))
        .init();

    let args = AgentArgs::parse();

    let client = reqwest::Client::builder()
        .timeout(args.request_timeout.into())
        .build()
        .expect("failed to build the upstream client");

    let engine = Engine::with_options(EngineOptions {
        new_id_on_collision: args.new_id_on_collision,
        ..Default::default()
    });

    let state = Arc::new(ProxyState {
        engine: RwLock::new(engine),
        upstream: Box::new(HttpUpstream::new(client, &args.upstream)),
    });

    let app = axum::Router::new().fallback(handle).with_state(state);

    let addr = SocketAddrV4::new(args.address, args.port);
    log::info!("agent listening on {}, upstream {}", addr, args.upstream);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to specified address");

    axum::serve(listener, app).await.expect("server error");
}

/// Catch-all handler: every path and method goes through the proxy.
async fn handle(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            log::error!("failed to read request body: {}", e);
            return synthesized_500();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let proxied = run_proxy(
        &state,
        ProxyRequest {
            method: parts.method.as_str().to_string(),
            path_and_query,
            headers,
            body,
        },
    )
    .await;

    let mut builder = Response::builder().status(proxied.status);
    for (name, value) in &proxied.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Body::from(proxied.body)) {
        Ok(response) => response,
        Err(e) => {
            log::error!("failed to assemble response: {}", e);
            synthesized_500()
        }
    }
}

fn synthesized_500() -> Response {
    Response::builder()
        .status(500)
        .header("content-type", negotiate::CONTENT_TYPE_JSON)
        .body(Body::from(negotiate::INTERNAL_ERROR_BODY))
        .expect("static response must assemble")
}
