//! Model backend resolution
//!
//! Builds the local backend and, when credentialed, the remote one.

use super::config::LlmConfig;
use anyhow::{Context, Result};
use anvil_llm::{
    LlmProvider, ModelRouter, OllamaConfig, OllamaProvider, OpenAiConfig, OpenAiProvider,
};
use std::sync::Arc;
use tracing::info;

/// Resolve backends and build the model router
pub fn resolve_model_router(llm_config: &LlmConfig) -> Result<Arc<ModelRouter>> {
    let mut ollama_config =
        OllamaConfig::from_env().with_model(llm_config.router.local_model.clone());
    let url_from_env =
        std::env::var("OLLAMA_BASE_URL").is_ok() || std::env::var("OLLAMA_HOST").is_ok();
    if let (false, Some(url)) = (url_from_env, &llm_config.ollama_url) {
        ollama_config = ollama_config.with_base_url(url.clone());
    }
    info!(url = %ollama_config.base_url, "Using Ollama as the local backend");

    let local: Arc<dyn LlmProvider> = Arc::new(
        OllamaProvider::new(ollama_config).context("Failed to create Ollama client")?,
    );

    // The router checks the credential and falls back to local on its own
    let remote: Option<Arc<dyn LlmProvider>> = if llm_config.remote_enabled {
        Some(Arc::new(OpenAiProvider::new(OpenAiConfig::from_env())))
    } else {
        info!("Remote backend disabled by configuration");
        None
    };

    Ok(Arc::new(ModelRouter::new(
        llm_config.router.clone(),
        local,
        remote,
    )))
}
