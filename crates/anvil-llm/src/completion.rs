//! Requests and responses exchanged with model backends
//!
//! Every model call in Anvil is a single turn: one system prompt and one user
//! prompt, answered with text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model
    System,
    /// Data the model works on
    User,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
        })
    }
}

/// One prompt message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: MessageRole,
    /// Text
    pub content: String,
}

impl Message {
    /// Message with an explicit role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// System message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// User message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// Tokens consumed by one call, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens generated
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Usage from prompt and completion counts
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Prompt plus completion tokens
    #[must_use]
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A request to a backend
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Backend-specific model name; empty selects the backend default
    pub model: String,
    /// Prompt messages, in order
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: f32,
    /// Generation cap; the backend default when `None`
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Build a request
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<Message>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens: None,
        }
    }

    /// Cap the number of generated tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Text of every message with `role`, newline-joined
    #[must_use]
    pub fn content_of(&self, role: MessageRole) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A backend's answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Model that actually answered
    pub model: String,
    /// Token counts, when the backend reports them
    pub usage: Option<TokenUsage>,
    /// Why generation stopped
    pub stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = CompletionRequest::new(
            "llama3.2",
            vec![Message::system("be terse"), Message::user("hello")],
            0.7,
        )
        .with_max_tokens(100);

        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_tokens, Some(100));
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_content_of_role() {
        let request = CompletionRequest::new(
            "m",
            vec![
                Message::system("rules"),
                Message::user("first"),
                Message::user("second"),
            ],
            0.0,
        );

        assert_eq!(request.content_of(MessageRole::System), "rules");
        assert_eq!(request.content_of(MessageRole::User), "first\nsecond");
    }

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&Message::user("x")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"x"}"#);
        assert_eq!(MessageRole::System.to_string(), "system");
    }

    #[test]
    fn test_usage_total_saturates() {
        assert_eq!(TokenUsage::new(12, 30).total(), 42);
        assert_eq!(TokenUsage::new(u32::MAX, 1).total(), u32::MAX);
    }
}
