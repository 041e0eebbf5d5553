mod cli;
mod config;
mod encode;
mod error;
mod prepare;
mod sjpg;
mod transfer;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    // Config comes up before tracing so logging.filter can take effect.
    let cfg = config::load(args.config.clone()).await?;
    let filter_directive = cfg
        .logging
        .as_ref()
        .and_then(|l| l.filter.clone())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,stripcast=debug".to_string());
    fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .init();
    cli::run(args, cfg).await
}
