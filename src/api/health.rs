//! Health and statistics endpoints
//!
//! - `/health` — liveness plus which backend the router resolved
//! - `/api/stats` — read-only cache, limiter, approval and task counters

use std::collections::BTreeMap;
use std::sync::Arc;

use anvil_core::Orchestrator;
use anvil_llm::{Availability, CacheStats};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use super::response::ApiResponse;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `remote` or `local_fallback`
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Statistics snapshot
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub rate_limiter: LimiterStats,
    pub pending_approvals: usize,
    /// Task count per status
    pub tasks: BTreeMap<&'static str, usize>,
}

/// Model-call limiter counters
#[derive(Debug, Serialize)]
pub struct LimiterStats {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub tracked_identities: usize,
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

/// Create statistics routes
pub fn stats_routes() -> Router {
    Router::new().route("/api/stats", get(stats))
}

async fn health(Extension(orchestrator): Extension<Arc<Orchestrator>>) -> Json<HealthResponse> {
    let (backend, fallback_reason) = match orchestrator.router().availability() {
        Availability::Remote => ("remote", None),
        Availability::LocalFallback { reason } => ("local_fallback", Some(reason.clone())),
    };
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend,
        fallback_reason,
    })
}

async fn stats(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Json<ApiResponse<StatsResponse>> {
    let limiter = orchestrator.rate_limiter();
    let mut tasks = BTreeMap::new();
    for task in orchestrator.list_tasks() {
        *tasks.entry(task.status.as_str()).or_insert(0) += 1;
    }

    Json(ApiResponse::success(StatsResponse {
        cache: orchestrator.cache().stats(),
        rate_limiter: LimiterStats {
            requests_per_minute: limiter.config().requests_per_minute,
            requests_per_hour: limiter.config().requests_per_hour,
            tracked_identities: limiter.tracked_identities(),
        },
        pending_approvals: orchestrator.approvals().pending().len(),
        tasks,
    }))
}
