//! Orchestrator configuration

use anvil_llm::Complexity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::RetryConfig;

/// How far a call to `advance` drives a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Perform exactly one transition
    SingleStep,
    /// Keep stepping until the task is terminal
    #[default]
    RunToCompletion,
}

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Failed reviews tolerated per subtask before giving up
    pub max_retries: u32,
    /// Default mode for `advance`
    pub advance_mode: AdvanceMode,
    /// Retry policy for transient model and tool failures
    pub retry: RetryConfig,
    /// Deadline for a single model call
    pub call_timeout: Duration,
    /// Deadline for a single tool call
    pub tool_timeout: Duration,
    /// Maximum accumulated feedback length, in characters
    pub feedback_cap: usize,
    /// Park the task in `awaiting_approval` instead of failing when the
    /// review budget runs out
    pub escalate_to_approval: bool,
    /// Require approval before running a high-risk tool
    pub require_tool_approval: bool,
    /// How long a pending approval stays open
    pub approval_timeout: Duration,
    /// Complexity used to route the planner
    pub planner_complexity: Complexity,
    /// Planner temperature
    pub planner_temperature: f32,
    /// Coder temperature
    pub coder_temperature: f32,
    /// Reviewer temperature
    pub reviewer_temperature: f32,
    /// Where generated artifacts are written (disabled when `None`)
    pub artifact_dir: Option<PathBuf>,
    /// Largest plan accepted from the planner
    pub max_subtasks: usize,
    /// Rate-limit identity used by `submit`
    pub default_identity: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            advance_mode: AdvanceMode::default(),
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            feedback_cap: 2000,
            escalate_to_approval: false,
            require_tool_approval: true,
            approval_timeout: Duration::from_secs(300),
            planner_complexity: Complexity::Medium,
            planner_temperature: 0.2,
            coder_temperature: 0.2,
            reviewer_temperature: 0.0,
            artifact_dir: None,
            max_subtasks: 20,
            default_identity: "anonymous".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the review retry budget
    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the default advance mode
    #[must_use]
    pub fn with_advance_mode(mut self, mode: AdvanceMode) -> Self {
        self.advance_mode = mode;
        self
    }

    /// Set the transport retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-call model deadline
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the per-call tool deadline
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the feedback cap
    #[must_use]
    pub fn with_feedback_cap(mut self, cap: usize) -> Self {
        self.feedback_cap = cap;
        self
    }

    /// Escalate exhausted reviews to a human instead of failing
    #[must_use]
    pub fn with_escalation(mut self, enabled: bool) -> Self {
        self.escalate_to_approval = enabled;
        self
    }

    /// Require approval for high-risk tools
    #[must_use]
    pub fn with_tool_approval(mut self, required: bool) -> Self {
        self.require_tool_approval = required;
        self
    }

    /// Set how long approvals stay open
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Write artifacts under `dir`
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Set the maximum plan size
    #[must_use]
    pub fn with_max_subtasks(mut self, max: usize) -> Self {
        self.max_subtasks = max;
        self
    }

    /// Set the identity used by `submit`
    #[must_use]
    pub fn with_default_identity(mut self, identity: impl Into<String>) -> Self {
        self.default_identity = identity.into();
        self
    }
}
