//! The tool contract: a definition plus an async body

use crate::error::Result;
use crate::schema::validate_against_schema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// How much damage a tool can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Reads only
    Low,
    /// Writes within a narrow scope
    Medium,
    /// Writes files, runs commands or otherwise changes the system
    High,
}

impl RiskLevel {
    /// Lowercase name, as shown to the planner
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// High-risk calls wait for a human unless approvals are turned off
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        *self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the planner and the runner know about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Registry key
    pub name: String,
    /// One line for the planner prompt
    pub description: String,
    /// JSON object schema for the arguments
    pub parameters: Value,
    /// Approval class
    pub risk_level: RiskLevel,
    /// Disabled tools are hidden from the planner and refused by the runner
    pub enabled: bool,
}

impl ToolDefinition {
    /// Enabled, low-risk tool taking no arguments
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({"type": "object", "properties": {}}),
            risk_level: RiskLevel::Low,
            enabled: true,
        }
    }

    /// Argument schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Approval class
    #[must_use]
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Turn the tool on or off
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// What a tool call produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// `false` when the tool itself reported failure
    pub success: bool,
    /// Payload; `null` on failure
    pub output: Value,
    /// Failure description
    pub error: Option<String>,
    /// Wall time, stamped by the runner
    pub duration_ms: u64,
}

impl ToolResult {
    /// Successful call
    #[must_use]
    pub fn success(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    /// Failed call
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// Payload as text: strings as-is, `null` as empty, anything else as JSON
    #[must_use]
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            structured => structured.to_string(),
        }
    }
}

/// A callable tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Static description
    fn definition(&self) -> &ToolDefinition;

    /// Run with arguments that already passed [`Tool::validate_input`]
    async fn execute(&self, input: Value) -> Result<ToolResult>;

    /// Check arguments before running; defaults to the definition's schema
    fn validate_input(&self, input: &Value) -> Result<()> {
        validate_against_schema(&self.definition().parameters, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_high_risk_needs_approval() {
        assert!(!RiskLevel::Low.requires_approval());
        assert!(!RiskLevel::Medium.requires_approval());
        assert!(RiskLevel::High.requires_approval());
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
    }

    #[test]
    fn test_output_text() {
        assert_eq!(ToolResult::success(json!("hello"), 1).output_text(), "hello");
        assert_eq!(ToolResult::success(json!({"n": 1}), 1).output_text(), r#"{"n":1}"#);

        let failed = ToolResult::failure("disk full", 3);
        assert!(!failed.success);
        assert_eq!(failed.output_text(), "");
        assert_eq!(failed.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_definition_defaults() {
        let def = ToolDefinition::new("noop", "does nothing");
        assert!(def.enabled);
        assert_eq!(def.risk_level, RiskLevel::Low);
        assert!(def.parameters["properties"].as_object().unwrap().is_empty());
    }
}
