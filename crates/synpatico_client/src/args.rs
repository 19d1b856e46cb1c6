//! CLI args

use clap::Parser;

/// Synpatico client test driver arguments
#[derive(Parser)]
pub(crate) struct ClientArgs {
    /// The URL to request repeatedly.
    pub url: String,

    /// Number of requests to perform.
    #[clap(short, long)]
    #[clap(default_value_t = 10)]
    pub count: usize,

    /// Delay between requests
    #[clap(short, long)]
    #[clap(default_value = "500ms")]
    pub interval: humantime::Duration,

    /// The timeout for each request
    #[clap(short, long)]
    #[clap(default_value = synpatico::defaults::DEFAULT_TIMEOUT)]
    pub request_timeout: humantime::Duration,
}
