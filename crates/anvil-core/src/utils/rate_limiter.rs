//! Rate limiting with token buckets
//!
//! Every identity owns two buckets: one refilled over a minute, one over an
//! hour. A request is admitted only when both hold a whole token, and it then
//! takes one from each. A denial consumes nothing. Refill is computed lazily
//! from the time elapsed since the last check.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Configuration for rate limiting.
///
/// A limit of zero disables that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per minute
    pub requests_per_minute: u32,
    /// Requests allowed per hour
    pub requests_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with both limits
    #[must_use]
    pub fn new(requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
        }
    }

    /// Per-minute limit only
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, 0)
    }

    /// Per-hour limit only
    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self::new(0, max_requests)
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Whole tokens left in the minute bucket after this request
    pub remaining_minute: u32,
    /// Whole tokens left in the hour bucket after this request
    pub remaining_hour: u32,
    /// Time until a retry can succeed; zero when allowed
    pub retry_after: Duration,
}

/// Current bucket levels for an identity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitUsage {
    /// Tokens in the minute bucket
    pub minute_tokens: f64,
    /// Tokens in the hour bucket
    pub hour_tokens: f64,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    window: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            window,
            last_refill: now,
        }
    }

    fn is_unlimited(&self) -> bool {
        self.capacity == 0.0
    }

    fn refill(&mut self, now: Instant) {
        if self.is_unlimited() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() * self.capacity / self.window.as_secs_f64();
        self.tokens = (self.tokens + added).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }

    fn has_token(&self) -> bool {
        self.is_unlimited() || self.tokens >= 1.0
    }

    fn consume(&mut self) {
        if !self.is_unlimited() {
            self.tokens = (self.tokens - 1.0).max(0.0);
        }
    }

    fn remaining(&self) -> u32 {
        if self.is_unlimited() {
            u32::MAX
        } else {
            self.tokens.floor() as u32
        }
    }

    fn time_until_token(&self) -> Duration {
        if self.has_token() {
            return Duration::ZERO;
        }
        let missing = 1.0 - self.tokens;
        Duration::from_secs_f64(missing * self.window.as_secs_f64() / self.capacity)
    }

    fn is_full(&self) -> bool {
        self.is_unlimited() || self.tokens >= self.capacity
    }
}

#[derive(Debug, Clone)]
struct IdentityBuckets {
    minute: TokenBucket,
    hour: TokenBucket,
}

/// Token-bucket rate limiter keyed by identity
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, IdentityBuckets>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and consume one request for `identity`
    pub fn check(&self, identity: &str) -> RateLimitResult {
        self.check_at(identity, Instant::now())
    }

    /// Whether a request for `identity` is admitted (consumes on success)
    pub fn allow(&self, identity: &str) -> bool {
        self.check(identity).allowed
    }

    /// Check and consume, returning the wait time on denial.
    ///
    /// # Errors
    /// Returns the time until a retry can succeed.
    pub fn acquire(&self, identity: &str) -> std::result::Result<(), Duration> {
        let result = self.check(identity);
        if result.allowed {
            Ok(())
        } else {
            Err(result.retry_after)
        }
    }

    /// [`check`](Self::check) at an explicit instant
    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitResult {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let entry = buckets
            .entry(identity.to_string())
            .or_insert_with(|| IdentityBuckets {
                minute: TokenBucket::new(self.config.requests_per_minute, MINUTE, now),
                hour: TokenBucket::new(self.config.requests_per_hour, HOUR, now),
            });

        entry.minute.refill(now);
        entry.hour.refill(now);

        if entry.minute.has_token() && entry.hour.has_token() {
            entry.minute.consume();
            entry.hour.consume();
            return RateLimitResult {
                allowed: true,
                remaining_minute: entry.minute.remaining(),
                remaining_hour: entry.hour.remaining(),
                retry_after: Duration::ZERO,
            };
        }

        let retry_after = entry
            .minute
            .time_until_token()
            .max(entry.hour.time_until_token());
        debug!(
            identity = %identity,
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit denied"
        );

        RateLimitResult {
            allowed: false,
            remaining_minute: entry.minute.remaining(),
            remaining_hour: entry.hour.remaining(),
            retry_after,
        }
    }

    /// Current bucket levels without consuming
    #[must_use]
    pub fn usage(&self, identity: &str) -> Option<RateLimitUsage> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.get_mut(identity).map(|entry| {
            entry.minute.refill(now);
            entry.hour.refill(now);
            RateLimitUsage {
                minute_tokens: entry.minute.tokens,
                hour_tokens: entry.hour.tokens,
            }
        })
    }

    /// Number of identities currently tracked
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Forget an identity, restoring full buckets
    pub fn reset(&self, identity: &str) {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
    }

    /// Drop identities whose buckets have fully refilled. Returns the number
    /// removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, entry| {
            entry.minute.refill(now);
            entry.hour.refill(now);
            !(entry.minute.is_full() && entry.hour.is_full())
        });
        before - buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
