//! Utility modules for anvil-core
//!
//! Provides common utilities:
//! - retry: Retry logic with exponential backoff
//! - rate_limiter: Token-bucket admission control

mod rate_limiter;
mod retry;

pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimitUsage, RateLimiter};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
