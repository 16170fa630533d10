// SPDX-License-Identifier: MIT
//! Bounded retry with exponential backoff for contended writes.
//!
//! [`retry_on_conflict`] re-runs an async operation only while its error is
//! classified as a retryable conflict by the caller's predicate; any other
//! error returns immediately on the first attempt. The attempt budget,
//! delays, and give-up behavior are all explicit so tests can assert them.
//!
//! # Example
//!
//! ```ignore
//! let config = RetryConfig::default();
//! let value = retry_on_conflict(&config, is_write_conflict, || async {
//!     storage.write_thing().await
//! })
//! .await?;
//! ```

use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling the delay never grows past.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Near-zero delays for tests.
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

/// Run `f`, retrying with backoff while `is_conflict` says the error is
/// worth another try and attempts remain.
///
/// # Panics
///
/// Panics if `config.max_attempts` is 0.
pub async fn retry_on_conflict<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_conflict: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: Fn(&E) -> bool,
{
    assert!(config.max_attempts > 0, "RetryConfig.max_attempts must be at least 1");
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if is_conflict(&e) && attempt < config.max_attempts => {
                warn!(
                    attempt,
                    max = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    err = ?e,
                    "write conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                let next_ms = (delay.as_millis() as f64 * config.multiplier) as u128;
                delay = Duration::from_millis(next_ms.min(config.max_delay.as_millis()) as u64);
            }
            Err(e) => {
                if is_conflict(&e) {
                    warn!(attempt, max = config.max_attempts, err = ?e, "write conflict, attempts exhausted");
                }
                return Err(e);
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
