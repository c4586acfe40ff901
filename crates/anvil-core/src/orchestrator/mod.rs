//! Orchestrator - task state machine
//!
//! Drives each task through `planning` → `executing` → `reviewing`, looping
//! back to `executing` with review feedback until the subtask passes or the
//! retry budget runs out, with optional human approval gates.
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig` and `AdvanceMode`
//! - `core`: Orchestrator struct, builders and the task arena
//! - `process`: `advance` loop, step dispatch and approval gate
//! - `planning`: planner call and plan validation
//! - `execution`: code generation and tool dispatch
//! - `review`: reviewer call and deterministic tool checks
//! - `model_call`: cache, rate limit, retry and security pipeline
//! - `helpers`: events, artifact storage, text helpers
//! - `prompts`: role system prompts

mod config;
mod core;
mod execution;
mod helpers;
mod model_call;
mod planning;
mod process;
mod prompts;
mod review;

#[cfg(test)]
mod tests;

pub use config::{AdvanceMode, OrchestratorConfig};
pub use core::Orchestrator;
