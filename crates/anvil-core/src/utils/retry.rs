//! Exponential backoff for transient model and tool failures
//!
//! These attempts are separate from the review retry budget on a subtask:
//! a call that succeeds on its third try still counts as one attempt there.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts including the first; zero is treated as one
    pub max_attempts: u32,
    /// Wait after the first failure
    pub base_delay: Duration,
    /// Cap on any single wait, before jitter
    pub max_delay: Duration,
    /// Growth per failure
    pub factor: f64,
    /// Stretch each wait by a random 0-25%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default schedule
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retries
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Attempts including the first
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Wait after the first failure
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Cap on any single wait
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth per failure
    #[must_use]
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Toggle jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait following failure number `failures` (1-based)
    pub(crate) fn backoff(&self, failures: u32) -> Duration {
        let steps = failures.saturating_sub(1);
        let mut wait = self.base_delay;
        for _ in 0..steps {
            if wait >= self.max_delay {
                break;
            }
            wait = wait.mul_f64(self.factor.max(1.0));
        }
        let wait = wait.min(self.max_delay);

        if !self.jitter {
            return wait;
        }
        let spread = wait.as_millis() as u64 / 4;
        if spread == 0 {
            return wait;
        }
        wait + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// The operation kept failing, or failed permanently
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E: Display + std::fmt::Debug> {
    /// Error from the final attempt
    pub last_error: E,
    /// Attempts made
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or runs out of attempts.
///
/// ```ignore
/// let response = retry_with_backoff(
///     &config.retry,
///     || handle.invoke(messages.clone(), deadline),
///     anvil_llm::Error::is_transient,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display + std::fmt::Debug,
{
    let budget = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if attempt >= budget || !is_retryable(&error) {
            return Err(RetryError {
                last_error: error,
                attempts: attempt,
            });
        }

        let wait = config.backoff(attempt);
        warn!(
            attempt,
            budget,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        tokio::time::sleep(wait).await;
    }
}
