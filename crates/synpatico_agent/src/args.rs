//! CLI args

use std::net::Ipv4Addr;

use clap::Parser;

/// Synpatico agent (interception proxy) arguments
#[derive(Parser)]
pub(crate) struct AgentArgs {
    /// The IPv4 address for the agent to bind to.
    #[clap(short, long)]
    #[clap(default_value_t = Ipv4Addr::LOCALHOST)]
    pub address: Ipv4Addr,

    /// The port number for the agent to listen on.
    #[clap(short, long)]
    #[clap(default_value_t = synpatico::defaults::DEFAULT_PORT)]
    pub port: u16,

    /// Base URL of the upstream API requests are forwarded to.
    #[clap(short, long)]
    pub upstream: String,

    /// The timeout for upstream requests
    #[clap(short, long)]
    #[clap(default_value = synpatico::defaults::DEFAULT_TIMEOUT)]
    pub request_timeout: humantime::Duration,

    /// Assign a fresh structure id every time an already-known
    /// structure is learned, instead of reusing the deterministic id.
    #[clap(long)]
    pub new_id_on_collision: bool,
}
