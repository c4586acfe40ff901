//! Model router implementation
//!
//! This module contains the [`ModelRouter`] which maps a subtask's declared
//! complexity to a concrete backend and model, and the [`ModelHandle`] the
//! caller invokes.

use super::config::{RouterConfig, TierPricing};
use super::provider::LlmProvider;
use super::types::{Complexity, ModelTier};
use crate::completion::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Whether the remote backend can be used, resolved once at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Remote backend configured and credentialed
    Remote,
    /// Every request is served locally
    LocalFallback {
        /// Why the remote backend was rejected
        reason: String,
    },
}

impl Availability {
    /// Whether the remote backend is in use
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// A routed model: backend, model name and sampling temperature
#[derive(Clone)]
pub struct ModelHandle {
    provider: Arc<dyn LlmProvider>,
    /// Model identifier passed to the backend
    pub model_name: String,
    /// Temperature, passed through unchanged from the caller
    pub temperature: f32,
    /// Tier the handle was resolved to
    pub tier: ModelTier,
    /// Pricing of the resolved tier
    pub pricing: TierPricing,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider.name())
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("tier", &self.tier)
            .finish()
    }
}

impl ModelHandle {
    /// Backend serving this handle
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Name of the backend serving this handle
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Estimated cost of a call with the given usage
    #[must_use]
    pub fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        self.pricing
            .cost(usage.prompt_tokens, usage.completion_tokens)
    }

    /// Send `messages` to the backend, failing with [`Error::Timeout`] once
    /// `deadline` elapses.
    #[instrument(skip(self, messages), fields(provider = %self.provider.name(), model = %self.model_name))]
    pub async fn invoke(
        &self,
        messages: Vec<Message>,
        deadline: Duration,
    ) -> Result<CompletionResponse> {
        let request = CompletionRequest::new(&self.model_name, messages, self.temperature);

        match tokio::time::timeout(deadline, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Model call timed out");
                Err(Error::Timeout(deadline.as_millis() as u64))
            }
        }
    }
}

/// Routes subtasks to the local or remote backend by complexity
pub struct ModelRouter {
    local: Arc<dyn LlmProvider>,
    remote: Option<Arc<dyn LlmProvider>>,
    availability: Availability,
    config: RouterConfig,
}

impl ModelRouter {
    /// Create a router and resolve remote availability.
    ///
    /// The remote backend is used only when present and its credential
    /// check passes; otherwise every selection falls back to `local`.
    #[must_use]
    pub fn new(
        config: RouterConfig,
        local: Arc<dyn LlmProvider>,
        remote: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        let availability = match &remote {
            None => Availability::LocalFallback {
                reason: "no remote backend configured".to_string(),
            },
            Some(provider) => match provider.check_credentials() {
                Ok(()) => Availability::Remote,
                Err(e) => Availability::LocalFallback {
                    reason: e.to_string(),
                },
            },
        };

        match &availability {
            Availability::Remote => info!(
                local = %local.name(),
                remote = remote.as_ref().map(|p| p.name()).unwrap_or_default(),
                "Model router initialized with remote backend"
            ),
            Availability::LocalFallback { reason } => warn!(
                local = %local.name(),
                reason = %reason,
                "Remote backend unavailable, routing everything locally"
            ),
        }

        let remote = if availability.is_remote() { remote } else { None };

        Self {
            local,
            remote,
            availability,
            config,
        }
    }

    /// Create a router that only ever uses the local backend
    #[must_use]
    pub fn local_only(config: RouterConfig, local: Arc<dyn LlmProvider>) -> Self {
        Self::new(config, local, None)
    }

    /// Availability resolved at construction
    #[must_use]
    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Router configuration
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Select the model for a subtask.
    ///
    /// `simple` always goes local; `medium` and `complex` go remote when the
    /// remote backend is available.
    #[must_use]
    pub fn select(&self, complexity: Complexity, temperature: f32) -> ModelHandle {
        let wanted = complexity.recommended_tier();
        let (provider, tier) = match (&self.remote, wanted.is_remote()) {
            (Some(remote), true) => (Arc::clone(remote), wanted),
            _ => (Arc::clone(&self.local), ModelTier::Local),
        };

        debug!(
            complexity = %complexity,
            provider = %provider.name(),
            tier = ?tier,
            "Selected model"
        );

        ModelHandle {
            provider,
            model_name: self.config.model_for(tier).to_string(),
            temperature,
            tier,
            pricing: self.config.pricing_for(tier),
        }
    }
}
