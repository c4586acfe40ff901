//! Security filters
//!
//! Model-bound text passes through a [`SecurityFilter`] three ways: input is
//! screened for prompt injection, prompts are fenced so user content cannot
//! pose as instructions, and model output is redacted before it is stored.
//!
//! Detections are logged on the dedicated `security` target.

mod pattern;

pub use pattern::{PatternSecurityFilter, SecurityConfig, ThreatLevel, INJECTION_PHRASES};

use serde::{Deserialize, Serialize};

/// Where a piece of text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Submitted by the end user
    User,
    /// Produced by a model earlier in the task
    Model,
    /// Returned by a tool
    Tool,
}

impl InputSource {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::Tool => "tool",
        }
    }
}

/// Outcome of an injection check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjectionVerdict {
    /// Whether the text should be rejected
    pub is_malicious: bool,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
}

impl InjectionVerdict {
    /// A clean verdict
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            is_malicious: false,
            confidence: 0.0,
        }
    }
}

/// System and user prompt after protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPrompt {
    /// System prompt
    pub system: String,
    /// User prompt
    pub user: String,
}

/// Prompt-injection detection and output redaction
#[cfg_attr(test, mockall::automock)]
pub trait SecurityFilter: Send + Sync {
    /// Screen `text` for injection attempts
    fn check_injection(&self, text: &str, source: InputSource) -> InjectionVerdict;

    /// Fence user content so the model treats it as data
    fn protect_prompt(&self, system: &str, user: &str, source: InputSource) -> ProtectedPrompt;

    /// Redact secrets from model output
    fn sanitize_output(&self, text: &str) -> String;
}
