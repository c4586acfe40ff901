//! Middleware module for the Anvil HTTP server
//!
//! Provides:
//! - Rate limiting middleware

pub mod rate_limit;
