//! Local backend speaking Ollama's `/api/chat`
//!
//! `simple` subtasks always land here, and so does everything else while the
//! remote backend is unavailable.

use crate::error::{Error, Result};
use crate::router::{CompletionRequest, CompletionResponse, LlmProvider, Message, TokenUsage};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Model used when neither the request nor the environment names one
pub const DEFAULT_MODEL: &str = "qwen2.5:7b";

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const CHAT_PATH: &str = "/api/chat";

/// Longest backend error text passed through untouched
const MAX_DETAIL_LEN: usize = 120;

/// Error text mentioning these is replaced wholesale
const LOCAL_PATHS: &[&str] = &["/home", "/root", "/var", "/usr"];

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: Sampling,
}

#[derive(Debug, Serialize)]
struct Sampling {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

impl ChatReply {
    fn usage(&self) -> Option<TokenUsage> {
        Some(TokenUsage::new(self.prompt_eval_count?, self.eval_count?))
    }
}

/// Turn an Ollama error body into something safe to surface.
///
/// Local paths are never echoed back and long dumps are cut down.
fn describe_failure(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorReply>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let lower = detail.to_lowercase();

    if detail.is_empty() {
        format!("ollama returned {status}")
    } else if lower.contains("model") && (lower.contains("not found") || lower.contains("pull")) {
        "model is not pulled on the Ollama server (run `ollama pull <model>`)".to_string()
    } else if LOCAL_PATHS.iter().any(|p| detail.contains(p)) {
        "ollama reported an internal error".to_string()
    } else if detail.len() > MAX_DETAIL_LEN {
        let cut = detail
            .char_indices()
            .take_while(|(i, _)| *i < MAX_DETAIL_LEN)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &detail[..cut])
    } else {
        detail
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for the local backend
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Server root, without the API path
    pub base_url: String,
    /// Model used when a request leaves `model` empty
    pub default_model: String,
    /// Generation cap when a request sets none
    pub default_max_tokens: u32,
    /// Whole-request HTTP timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: 4096,
            timeout: Duration::from_secs(300),
        }
    }
}

impl OllamaConfig {
    /// Read `OLLAMA_BASE_URL` (or `OLLAMA_HOST`) and `OLLAMA_MODEL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = ["OLLAMA_BASE_URL", "OLLAMA_HOST"]
            .iter()
            .find_map(|key| std::env::var(key).ok())
        {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.default_model = model;
        }
        config
    }

    /// Point at another server
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use another default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Change the HTTP timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}{CHAT_PATH}", self.base_url.trim_end_matches('/'))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// The local backend
pub struct OllamaProvider {
    http: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Build the HTTP client for `config`
    ///
    /// # Errors
    /// [`Error::NotConfigured`] when the client cannot be built
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::NotConfigured(format!("ollama http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Provider for [`OllamaConfig::from_env`]
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    fn transport_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.timeout.as_millis() as u64)
        } else if err.is_connect() {
            Error::Network(format!("no Ollama server at {}", self.config.base_url))
        } else {
            Error::Network(err.to_string())
        }
    }

    async fn chat(&self, body: &ChatBody<'_>) -> Result<ChatReply> {
        let response = self
            .http
            .post(self.config.chat_url())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        match status {
            s if s.is_success() => {
                serde_json::from_str(&text).map_err(|e| Error::InvalidResponse(e.to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(Error::Throttled),
            s => Err(Error::Backend {
                status: s.as_u16(),
                message: describe_failure(s, &text),
            }),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = match request.model.as_str() {
            "" => self.config.default_model.as_str(),
            named => named,
        };
        let body = ChatBody {
            model,
            messages: &request.messages,
            stream: false,
            options: Sampling {
                temperature: request.temperature,
                num_predict: request
                    .max_tokens
                    .unwrap_or(self.config.default_max_tokens),
            },
        };

        debug!(messages = request.messages.len(), "ollama chat");
        let reply = self.chat(&body).await?;
        let usage = reply.usage();

        Ok(CompletionResponse {
            content: reply.message.content,
            model: reply.model,
            usage,
            stop_reason: reply.done_reason,
        })
    }
}
