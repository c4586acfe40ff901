//! Scriptable model backend for testing
//!
//! Responses come from a handler closure when one is installed, otherwise
//! from a FIFO queue. Every call is recorded.

use super::provider::LlmProvider;
use crate::completion::{CompletionRequest, CompletionResponse, MessageRole, TokenUsage};
use crate::error::{Error, Result};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Handler = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;

/// A recorded call to [`MockProvider`]
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Model requested
    pub model: String,
    /// Concatenated system messages
    pub system: String,
    /// Concatenated user messages
    pub user: String,
    /// Temperature requested
    pub temperature: f32,
}

/// A mock backend that returns scripted responses.
pub struct MockProvider {
    name: String,
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    handler: Option<Arc<Handler>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    credentials_ok: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            handler: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            credentials_ok: true,
        }
    }

    /// Set the provider name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the credential check fail
    #[must_use]
    pub fn without_credentials(mut self) -> Self {
        self.credentials_ok = false;
        self
    }

    /// Answer every call with `handler` instead of the queue
    #[must_use]
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Add a response to the queue.
    pub fn push_response(&self, content: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(content.into()));
    }

    /// Add an error to the queue.
    pub fn push_error(&self, error: Error) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls whose system prompt contains `marker`
    #[must_use]
    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.system.contains(marker))
            .count()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn check_credentials(&self) -> Result<()> {
        if self.credentials_ok {
            Ok(())
        } else {
            Err(Error::NotConfigured(format!("{}: missing api key", self.name)))
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                model: request.model.clone(),
                system: request.content_of(MessageRole::System),
                user: request.content_of(MessageRole::User),
                temperature: request.temperature,
            });

        let content = match &self.handler {
            Some(handler) => handler(&request)?,
            None => {
                let next = self
                    .responses
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pop_front();
                next.unwrap_or_else(|| Ok("mock response".to_string()))?
            }
        };

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count() as u32)
            .sum();
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(CompletionResponse {
            content,
            usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
            stop_reason: Some("stop".to_string()),
            model: request.model,
        })
    }
}
