use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use musicshare::config::{Args, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musicshare=info")),
        )
        .init();

    let config = Config::from(Args::parse());
    if let Err(err) = musicshare::serve::run(config).await {
        error!(%err, "exiting");
        std::process::exit(1);
    }
}
