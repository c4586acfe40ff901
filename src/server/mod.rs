//! Server module for Anvil
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `providers`: Model backend resolution
//! - `builder`: Orchestrator construction shared by every command
//! - `init`: HTTP server initialization and run loop

mod builder;
pub mod config;
mod init;
mod loader;
mod providers;

pub use builder::build_orchestrator;
pub use init::{build_app, run};
pub use loader::load_config;
