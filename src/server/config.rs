//! Configuration structures for the Anvil server

use anvil_core::{
    AdvanceMode, OrchestratorConfig, RateLimitConfig, RetryConfig, SecurityConfig,
};
use anvil_llm::RouterConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::middleware::rate_limit::RateLimitSettings;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    /// Admission for model calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Admission for HTTP requests
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Ollama server URL; `OLLAMA_BASE_URL` wins when set
    #[serde(default)]
    pub ollama_url: Option<String>,
    /// Use the remote backend when its credential is present
    #[serde(default = "default_true")]
    pub remote_enabled: bool,
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: None,
            remote_enabled: true,
            router: RouterConfig::default(),
        }
    }
}

/// Orchestrator configuration as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub advance_mode: AdvanceMode,
    #[serde(default)]
    pub escalate_to_approval: bool,
    #[serde(default = "default_true")]
    pub require_tool_approval: bool,
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_feedback_cap")]
    pub feedback_cap: usize,
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,
    #[serde(default = "default_identity")]
    pub default_identity: String,
    /// Attempts per model or tool call, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_approval_timeout_secs() -> u64 {
    300
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_feedback_cap() -> usize {
    2000
}

fn default_max_subtasks() -> usize {
    20
}

fn default_identity() -> String {
    "anonymous".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            advance_mode: AdvanceMode::default(),
            escalate_to_approval: false,
            require_tool_approval: true,
            approval_timeout_secs: default_approval_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            feedback_cap: default_feedback_cap(),
            max_subtasks: default_max_subtasks(),
            default_identity: default_identity(),
            retry_attempts: default_retry_attempts(),
            artifact_dir: None,
        }
    }
}

impl OrchestratorSettings {
    /// Runtime configuration for the orchestrator
    pub fn to_runtime(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new()
            .with_max_retries(self.max_retries)
            .with_advance_mode(self.advance_mode)
            .with_retry(RetryConfig::default().with_max_attempts(self.retry_attempts))
            .with_call_timeout(Duration::from_secs(self.call_timeout_secs))
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs))
            .with_feedback_cap(self.feedback_cap)
            .with_escalation(self.escalate_to_approval)
            .with_tool_approval(self.require_tool_approval)
            .with_approval_timeout(Duration::from_secs(self.approval_timeout_secs))
            .with_max_subtasks(self.max_subtasks)
            .with_default_identity(self.default_identity.clone());
        if let Some(dir) = &self.artifact_dir {
            config = config.with_artifact_dir(dir.clone());
        }
        config
    }
}

/// Built-in tool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Root directory for the file tools
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
        }
    }
}
