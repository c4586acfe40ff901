//! Anvil LLM - model backends, routing and response caching
//!
//! This crate provides the model side of Anvil:
//! - Router: provider trait and complexity-based model selection
//! - Cache: content-addressed, LRU + TTL bounded response cache
//! - Ollama: local backend
//! - OpenAI: remote backend

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod completion;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod router;

pub use cache::{cache_key, global_cache, CacheConfig, CacheEntry, CacheStats, ResponseCache};
pub use error::{Error, Result};
pub use router::{
    Availability, CompletionRequest, CompletionResponse, Complexity, LlmProvider, Message,
    MessageRole, MockCall, MockProvider, ModelHandle, ModelRouter, ModelTier, RouterConfig,
    TierPricing, TokenUsage,
};

pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
