//! Remote backend over the OpenAI chat completions API
//!
//! Uses async-openai, so any compatible endpoint works through `base_url`.

use crate::error::{Error, Result};
use crate::router::{
    CompletionRequest, CompletionResponse, LlmProvider, Message, MessageRole, TokenUsage,
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
    Client,
};
use std::fmt;
use tracing::{debug, instrument};

/// Model used when neither the request nor the environment names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const MAX_DETAIL_LEN: usize = 300;

#[derive(Clone, Copy)]
enum Kind {
    Throttled,
    Auth,
    Transport,
}

/// Lowercase fragments of async-openai error text and what they mean.
/// First match wins.
const NEEDLES: &[(&str, Kind)] = &[
    ("rate limit", Kind::Throttled),
    ("429", Kind::Throttled),
    ("api key", Kind::Auth),
    ("unauthorized", Kind::Auth),
    ("authentication", Kind::Auth),
    ("401", Kind::Auth),
    ("timed out", Kind::Transport),
    ("timeout", Kind::Transport),
    ("error sending request", Kind::Transport),
    ("connection", Kind::Transport),
];

/// async-openai flattens most failures into strings, so classify by text
fn classify(err: &OpenAIError) -> Error {
    let text = err.to_string();
    let lower = text.to_lowercase();

    match NEEDLES.iter().find(|(needle, _)| lower.contains(needle)) {
        Some((_, Kind::Throttled)) => Error::Throttled,
        Some((_, Kind::Auth)) => Error::Authentication("remote backend rejected the API key".into()),
        Some((_, Kind::Transport)) => Error::Network(text),
        None => Error::backend(truncate(&text)),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Show only the ends of a secret
fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Remote backend settings
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Bearer credential; empty means unavailable
    pub api_key: String,
    /// Compatible endpoint replacing api.openai.com
    pub base_url: Option<String>,
    /// Model used when a request leaves `model` empty
    pub default_model: String,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl OpenAiConfig {
    /// Settings with `api_key` and the default model
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    ///
    /// A missing key is left empty; the router's credential check turns it
    /// into a local fallback.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default());
        config.base_url = std::env::var("OPENAI_BASE_URL").ok();
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.default_model = model;
        }
        config
    }

    /// Use a compatible endpoint
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// The remote backend
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    has_key: bool,
    default_model: String,
}

impl OpenAiProvider {
    /// Provider for `config`; never fails, a blank key is reported later
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        let mut wire = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            wire = wire.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(wire),
            has_key: !config.api_key.trim().is_empty(),
            default_model: config.default_model,
        }
    }

    /// Provider for [`OpenAiConfig::from_env`]
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(OpenAiConfig::from_env())
    }
}

fn to_wire(message: &Message) -> ChatCompletionRequestMessage {
    let text = message.content.clone();
    match message.role {
        MessageRole::System => ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(text),
            name: None,
        }
        .into(),
        MessageRole::User => ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(text),
            name: None,
        }
        .into(),
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn check_credentials(&self) -> Result<()> {
        if self.has_key {
            Ok(())
        } else {
            Err(Error::NotConfigured("OPENAI_API_KEY is not set".to_string()))
        }
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let body = CreateChatCompletionRequest {
            model,
            messages: request.messages.iter().map(to_wire).collect(),
            max_completion_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            ..Default::default()
        };

        debug!(messages = body.messages.len(), "openai chat");
        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(|e| classify(&e))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("response has no choices".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            stop_reason: choice.finish_reason.map(|r| format!("{r:?}").to_lowercase()),
        })
    }
}
