//! Anvil Tools - what tool subtasks run
//!
//! - Tool: definitions, risk levels and the async `Tool` trait
//! - Schema: argument validation
//! - Registry: name-keyed tool set
//! - Runner: gated execution under a deadline
//! - Builtins: echo and workspace file tools

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod tool;

pub use builtins::register_builtins;
pub use error::{Error, Result};
pub use registry::ToolRegistry;
pub use runner::{CallOptions, RunnerConfig, ToolRunner};
pub use schema::validate_against_schema;
pub use tool::{RiskLevel, Tool, ToolDefinition, ToolResult};
