//! Error types for anvil-core
//!
//! Every error maps onto an [`ErrorCategory`] that decides how the
//! orchestrator reacts to it, and onto a user-facing message.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// How an error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Timeouts, transport faults, upstream throttling: retried locally
    Transient,
    /// Malformed plan, unknown tool, bad arguments: fail immediately
    Validation,
    /// Review failures and denied approvals
    Policy,
    /// Injection detected in user input
    Security,
    /// Local resource limits (rate limiting, storage)
    Resource,
    /// Everything else
    Internal,
}

impl ErrorCategory {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Validation => "validation",
            Self::Policy => "policy",
            Self::Security => "security",
            Self::Resource => "resource",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Planner output or arguments failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Review retry budget exhausted or approval rejected
    #[error("policy error: {0}")]
    Policy(String),

    /// Prompt injection detected
    #[error("security error: {0}")]
    Security(String),

    /// Admission denied by the rate limiter
    #[error("rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    RateLimited {
        /// Time until a retry can succeed
        retry_after: Duration,
    },

    /// Transient failures persisted through every retry
    #[error("retries exhausted after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure
        message: String,
    },

    /// Unknown task
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Operation not valid in the task's current status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Approval timeout or rejection
    #[error("approval error: {0}")]
    Approval(String),

    /// Invalid settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Model backend error
    #[error("llm error: {0}")]
    Llm(#[from] anvil_llm::Error),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(#[from] anvil_tools::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Category of this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) | Error::InvalidState(_) | Error::TaskNotFound(_) => {
                ErrorCategory::Validation
            }
            Error::Policy(_) | Error::Approval(_) => ErrorCategory::Policy,
            Error::Security(_) => ErrorCategory::Security,
            Error::RateLimited { .. } => ErrorCategory::Resource,
            Error::RetriesExhausted { .. } => ErrorCategory::Transient,
            Error::Llm(e) if e.is_transient() => ErrorCategory::Transient,
            Error::Tool(e) => match e {
                anvil_tools::Error::NotFound(_) | anvil_tools::Error::InvalidInput(_) => {
                    ErrorCategory::Validation
                }
                anvil_tools::Error::PermissionDenied(_) => ErrorCategory::Policy,
                anvil_tools::Error::Timeout(_) => ErrorCategory::Transient,
                _ => ErrorCategory::Internal,
            },
            Error::Llm(_) | Error::Configuration(_) | Error::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether a retry of the failing call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Llm(e) => e.is_transient(),
            Error::Tool(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Message stored on a failed task: the category followed by the error
    #[must_use]
    pub fn task_message(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => format!("The plan or its arguments were invalid: {msg}"),
            Error::Policy(msg) => format!("The result did not pass review: {msg}"),
            Error::Security(_) => "The request was rejected by the security filter.".to_string(),
            Error::RateLimited { retry_after } => format!(
                "Rate limit exceeded. Please wait {} seconds.",
                retry_after.as_secs().max(1)
            ),
            Error::RetriesExhausted { .. } => {
                "The model backend is not responding reliably.".to_string()
            }
            Error::TaskNotFound(id) => format!("No task with id {id}."),
            Error::InvalidState(msg) => format!("That action is not possible right now: {msg}"),
            Error::Approval(msg) => format!("Approval required: {msg}"),
            Error::Configuration(msg) => format!("Configuration error: {msg}"),
            Error::Llm(e) => format!("Model error: {e}"),
            Error::Tool(e) => format!("Tool error: {e}"),
            Error::Internal(msg) => format!("Internal error: {msg}"),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::RateLimited { .. } => Some("Wait before retrying.".to_string()),
            Error::RetriesExhausted { .. } => Some(
                "Check that the model backend is reachable (is Ollama running?).".to_string(),
            ),
            Error::Validation(_) => {
                Some("Try rephrasing the request as smaller steps.".to_string())
            }
            Error::Approval(_) => {
                Some("Review the pending approval and approve or reject it.".to_string())
            }
            Error::Configuration(_) => {
                Some("Check config/default.toml and ANVIL_* environment variables.".to_string())
            }
            Error::Llm(anvil_llm::Error::NotConfigured(_) | anvil_llm::Error::Authentication(_)) => {
                Some("Set OPENAI_API_KEY or rely on the local backend.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
#[must_use]
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::Validation("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .category(),
            ErrorCategory::Resource
        );
        assert_eq!(
            Error::Llm(anvil_llm::Error::Timeout(10)).category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            Error::Llm(anvil_llm::Error::Authentication("k".into())).category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            Error::Tool(anvil_tools::Error::NotFound("t".into())).category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_task_message_prefixed_by_category() {
        let msg = Error::Security("injection".into()).task_message();
        assert!(msg.starts_with("security: "));
    }

    #[test]
    fn test_cli_format_includes_suggestion() {
        let text = format_error_for_cli(&Error::RateLimited {
            retry_after: Duration::from_millis(1500),
        });
        assert!(text.contains("wait 1 seconds"));
        assert!(text.contains("Wait before retrying"));
    }
}
