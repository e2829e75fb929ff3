use std::time::Duration;

use clap::Parser;
use simulator::{
    Settings,
    models::{DEFAULT_ENDPOINT, INTERVAL_SECS},
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Ingest endpoint of the traffic backend
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    url: String,

    /// Seconds between batches
    #[arg(long, default_value_t = INTERVAL_SECS)]
    interval: u64,

    /// Stop after this many batches
    #[arg(long)]
    batches: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();

    simulator::run(Settings {
        endpoint: args.url,
        interval: Duration::from_secs(args.interval),
        batches: args.batches,
    })
    .await
}
