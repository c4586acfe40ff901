//! The seam between the router and a concrete model backend

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// A model backend the router can send single-turn requests to
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend label used in logs and events
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty
    fn default_model(&self) -> &str;

    /// Check that the backend has what it needs to serve requests.
    ///
    /// Must not perform network I/O; the router calls this once at
    /// construction to decide whether the backend is usable.
    fn check_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Answer one request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
