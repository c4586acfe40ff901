//! Web API module for Anvil
//!
//! Provides REST API endpoints for:
//! - Task submission, status, approval and interruption
//! - Per-task status streams (server-sent events)
//! - Health and read-only cache/limiter statistics

pub mod health;
pub mod response;
pub mod tasks;

use axum::Router;

pub use health::{health_routes, stats_routes};
pub use response::{ApiError, ApiResponse};
pub use tasks::tasks_routes;

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new().merge(tasks_routes()).merge(stats_routes())
}
