//! Orchestrator builder
//!
//! Shared by `anvil serve` and `anvil run`: config → backends → tools →
//! orchestrator.

use super::config::AppConfig;
use super::providers::resolve_model_router;
use anyhow::Result;
use anvil_core::{Orchestrator, PatternSecurityFilter, RateLimiter};
use anvil_tools::{register_builtins, RunnerConfig, ToolRegistry, ToolRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build an orchestrator from the application configuration
pub fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>> {
    let router = resolve_model_router(&config.llm)?;

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, config.tools.workspace_dir.clone());
    info!(
        tools = registry.len(),
        workspace = %config.tools.workspace_dir.display(),
        "Registered built-in tools"
    );

    // With approvals off, high-risk tools must still be runnable
    let runner_config = RunnerConfig::default()
        .with_timeout(Duration::from_secs(config.orchestrator.tool_timeout_secs))
        .with_high_risk(!config.orchestrator.require_tool_approval);
    let runner = ToolRunner::new(Arc::new(registry), runner_config);

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let security = Arc::new(PatternSecurityFilter::new(config.security.clone()));

    let orchestrator = Orchestrator::new(router, runner, config.orchestrator.to_runtime())
        .with_rate_limiter(limiter)
        .with_security_filter(security);

    Ok(Arc::new(orchestrator))
}
