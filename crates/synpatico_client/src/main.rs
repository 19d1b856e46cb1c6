//! Test driver: fires repeated requests at an endpoint through the
//! middleware and reports what the negotiation saved.

mod args;

use clap::Parser;
use synpatico_client::SynpaticoClient;

use crate::args::ClientArgs;

#[tokio::main]
async fn main() {
    match std::env::var("RUST_LOG") {
        Ok(_) => (),
        Err(_) => std::env::set_var("RUST_LOG", "INFO"),
    }

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").expect("RUST_LOG environment variable not set"))
        .init();

    let args = ClientArgs::parse();

    let http = reqwest::Client::builder()
        .timeout(args.request_timeout.into())
        .build()
        .expect("failed to build the http client");

    let client = SynpaticoClient::with_http(http);

    for request_num in 0..args.count {
        match client.get(&args.url).await {
            Ok(response) => log::info!(
                "request #{}: {} {} bytes{}",
                request_num,
                response.status,
                response.body.len(),
                if response.optimized { " (optimized)" } else { "" }
            ),
            Err(e) => log::error!("request #{} failed: {}", request_num, e),
        }

        tokio::time::sleep(args.interval.into()).await;
    }

    let stats = client.stats();

    log::info!(
        "{} requests, {} optimized, {} conflicts",
        stats.requests,
        stats.optimized_responses,
        stats.conflicts
    );
    log::info!(
        "{} payload bytes over {} wire bytes: saved {} ({:.1}%)",
        stats.payload_bytes,
        stats.wire_bytes,
        stats.bytes_saved(),
        stats.savings_ratio() * 100.0
    );
}
