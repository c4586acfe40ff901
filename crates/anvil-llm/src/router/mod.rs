//! Router - model backend abstraction and complexity-based routing
//!
//! Subtasks declare a [`Complexity`]; the [`ModelRouter`] turns that into a
//! [`ModelHandle`] bound to either the local or the remote backend.
//!
//! Remote availability is resolved once, when the router is built, and kept
//! as an explicit [`Availability`] value. Selection itself never performs I/O.
//!
//! # Module Structure
//!
//! - `types`: Core types (Complexity, ModelTier)
//! - `config`: Model names and pricing per tier
//! - `provider`: LlmProvider trait definition
//! - `mock`: Scriptable provider for testing
//! - `router_impl`: ModelRouter and ModelHandle

mod config;
mod mock;
mod provider;
mod router_impl;
mod types;

#[cfg(test)]
mod tests;

pub use crate::completion::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage,
};

pub use config::{RouterConfig, TierPricing};
pub use mock::{MockCall, MockProvider};
pub use provider::LlmProvider;
pub use router_impl::{Availability, ModelHandle, ModelRouter};
pub use types::{Complexity, ModelTier};
