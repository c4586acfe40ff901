//! Executes registered tools behind the enabled flag, the risk gate,
//! argument validation and a deadline.

use crate::error::{Error, Result};
use crate::registry::ToolRegistry;
use crate::tool::ToolResult;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Runner-wide limits
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Deadline for calls that set none
    pub call_timeout: Duration,
    /// Upper bound on any per-call deadline
    pub timeout_ceiling: Duration,
    /// Run high-risk tools without a per-call approval
    pub allow_high_risk: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            timeout_ceiling: Duration::from_secs(300),
            allow_high_risk: false,
        }
    }
}

impl RunnerConfig {
    /// Deadline for calls that set none
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Upper bound on any per-call deadline
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.timeout_ceiling = ceiling;
        self
    }

    /// Whether high-risk tools run without approval
    #[must_use]
    pub fn with_high_risk(mut self, allowed: bool) -> Self {
        self.allow_high_risk = allowed;
        self
    }
}

/// Per-call settings
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Overrides [`RunnerConfig::call_timeout`], capped by the ceiling
    pub deadline: Option<Duration>,
    /// A human approved this call
    pub approved: bool,
}

impl CallOptions {
    /// No deadline override, not approved
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Record approval
    #[must_use]
    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }
}

/// Runs tools out of a shared registry
#[derive(Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    config: RunnerConfig,
}

impl ToolRunner {
    /// Runner over `registry`
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Runner with [`RunnerConfig::default`]
    #[must_use]
    pub fn with_defaults(registry: Arc<ToolRegistry>) -> Self {
        Self::new(registry, RunnerConfig::default())
    }

    /// The tools this runner can call
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `tool_name` with default options
    pub async fn invoke_default(&self, tool_name: &str, input: Value) -> Result<ToolResult> {
        self.invoke(tool_name, input, CallOptions::new()).await
    }

    /// Run `tool_name`.
    ///
    /// A tool that errors out yields a failed [`ToolResult`]. Unknown or
    /// disabled tools, missing approval, bad arguments and deadline misses
    /// are `Err`.
    #[instrument(skip(self, input, options), fields(tool = %tool_name))]
    pub async fn invoke(
        &self,
        tool_name: &str,
        input: Value,
        options: CallOptions,
    ) -> Result<ToolResult> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| Error::NotFound(tool_name.to_string()))?;
        let definition = tool.definition();

        if !definition.enabled {
            return Err(Error::PermissionDenied(format!("'{tool_name}' is disabled")));
        }
        if definition.risk_level.requires_approval()
            && !(self.config.allow_high_risk || options.approved)
        {
            warn!("Blocked unapproved high-risk tool");
            return Err(Error::PermissionDenied(format!(
                "'{tool_name}' is high risk and needs approval"
            )));
        }
        tool.validate_input(&input)?;

        let deadline = options
            .deadline
            .unwrap_or(self.config.call_timeout)
            .min(self.config.timeout_ceiling);
        let started = Instant::now();

        let outcome = tokio::time::timeout(deadline, tool.execute(input)).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(error = %e, "Tool reported failure");
                ToolResult::failure(e.to_string(), elapsed)
            }
            Err(_) => return Err(Error::Timeout(deadline.as_millis() as u64)),
        };
        result.duration_ms = elapsed;

        debug!(success = result.success, duration_ms = elapsed, "Tool returned");
        Ok(result)
    }
}
