//! Server initialization and main run loop

use super::builder::build_orchestrator;
use super::config::AppConfig;
use crate::middleware::rate_limit::{spawn_sweeper, RateLimitLayer};
use anyhow::{Context, Result};
use anvil_core::Orchestrator;
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Run the HTTP server until Ctrl-C
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Anvil server v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = build_orchestrator(&config)?;
    let shutdown = CancellationToken::new();

    let rate_limit_layer = RateLimitLayer::new(&config.server.rate_limit);
    spawn_sweeper(
        rate_limit_layer.state().limiter().clone(),
        shutdown.clone(),
        "http",
    );
    spawn_sweeper(
        orchestrator.rate_limiter().clone(),
        shutdown.clone(),
        "model",
    );

    let cache = orchestrator.cache().clone();
    let app = build_app(orchestrator).layer(rate_limit_layer);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("HTTP server error")?;

    tokio::task::spawn_blocking(move || cache.flush())
        .await
        .context("Cache flush task failed")?;
    info!("Anvil shutdown complete");
    Ok(())
}

/// Routes and shared layers, without admission control
pub fn build_app(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .merge(crate::api::health_routes())
        .merge(crate::api::api_router())
        .layer(Extension(orchestrator))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
