mod config;
mod conn;
mod error;
mod gate;
mod pool;
mod server;
mod stats;

use anyhow::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = start().await {
        error!("server failed: {err:#}");
        std::process::exit(1);
    }
}

async fn start() -> Result<()> {
    let config = config::ServerConfig::from_env()?;

    server::run(config, stats::Stats::default()).await
}
