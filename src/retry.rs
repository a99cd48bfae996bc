//! Retry utilities with exponential backoff and jitter.
//!
//! Wraps one fetch-merge-persist cycle so transient ConfigMap failures (API
//! errors, write conflicts with a concurrent writer) are absorbed before the
//! caller sees them.
//!
//! # Example
//!
//! ```ignore
//! use awsauth::retry::{retry_with_backoff, RetryConfig};
//!
//! let outcome = retry_with_backoff(
//!     &RetryConfig::default(),
//!     "upsert mapRole",
//!     || async { store.sync(&request).await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::Error;

/// Multiplier applied to the delay after every failed attempt
pub const BACKOFF_FACTOR: u32 = 2;

/// Retry budget and delay bounds for a synchronization cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (must be at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub min_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Reject budgets that could never run an attempt
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts < 1 {
            return Err(Error::validation(
                "retry max count must be greater than zero",
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(Error::validation(format!(
                "min retry delay {:?} exceeds max retry delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Un-jittered delay before retrying after failed attempt number `attempt`.
///
/// Attempts are 1-based: the first failure waits `min`, each further failure
/// doubles the wait, and the result never exceeds `max`.
pub fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    min.checked_mul(BACKOFF_FACTOR.saturating_pow(exponent))
        .map_or(max, |d| d.min(max))
}

/// Spread `delay` uniformly over `[min, delay]` so concurrent writers that
/// failed together do not retry together.
pub fn jittered(delay: Duration, min: Duration, rng: &mut impl Rng) -> Duration {
    if delay <= min {
        return delay;
    }
    rng.gen_range(min..=delay)
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Retries until success, a non-retryable error, or until `max_attempts`
/// attempts have failed. Exhaustion returns the last error wrapped in
/// [`Error::RetryExhausted`]; non-retryable errors are returned unwrapped.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let delay = jittered(
                    backoff_delay(attempt, config.min_delay, config.max_delay),
                    config.min_delay,
                    &mut rand::thread_rng(),
                );

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
