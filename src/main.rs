//! Anvil - plans a request, generates each step with a routed model, and
//! reviews the result before moving on.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cli;
mod middleware;
mod server;

const DEFAULT_LOG_FILTER: &str = "anvil=info,anvil_core=info,anvil_llm=info,tower_http=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = cli::Cli::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "anvil starting");
    cli::run(cli).await
}
