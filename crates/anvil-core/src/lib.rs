//! Anvil Core - Orchestration Engine
//!
//! This crate provides the task orchestration logic for Anvil, including:
//! - Orchestrator: the plan → generate → review state machine
//! - Approval: human-in-the-loop gates with fail-safe expiry
//! - Events: broadcast lifecycle events for status streams
//! - Security: prompt-injection screening and output redaction
//! - Utils: token-bucket rate limiting and retry with backoff

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod approval;
pub mod error;
pub mod event_bus;
pub mod orchestrator;
pub mod security;
pub mod task;
pub mod utils;

pub use approval::{
    ApprovalDecision, ApprovalManager, ApprovalOutcome, ApprovalReason, ApprovalRequest,
};
pub use error::{format_error_for_cli, Error, ErrorCategory, Result, UserFriendlyError};
pub use event_bus::{EventBus, TaskEvent};
pub use orchestrator::{AdvanceMode, Orchestrator, OrchestratorConfig};
pub use security::{
    InjectionVerdict, InputSource, PatternSecurityFilter, ProtectedPrompt, SecurityConfig,
    SecurityFilter,
};
pub use task::{
    CriterionResult, ReviewFeedback, Subtask, SubtaskKind, SubtaskResult, TaskId, TaskState,
    TaskStatus, UsageTotals,
};
pub use utils::{
    retry_with_backoff, RateLimitConfig, RateLimitResult, RateLimitUsage, RateLimiter,
    RetryConfig, RetryError,
};
