//! Retry policy with bounded exponential backoff for venue calls.
//!
//! Every venue call runs under `call_timeout_ms`. A timeout is treated as a
//! retryable network failure, never as success or a final failure.
//! Rate-limited calls wait for the larger of the venue's retry-after hint
//! and the computed backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExecutorError, ExecutorResult};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Randomisation range as a fraction of the backoff (0.2 = ±20%).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Upper bound on a single venue call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` is the 1-based
    /// number of the attempt that just failed. Capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let base = base.min(self.max_backoff_ms as f64);

        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 && base > 0.0 {
            let range = base * jitter;
            rand::rng().random_range((base - range)..=(base + range))
        } else {
            base
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = jittered.min(self.max_backoff_ms as f64).max(0.0) as u64;
        Duration::from_millis(ms)
    }

    /// Wait after `error` on attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, error: &ExecutorError, attempt: u32) -> Duration {
        let backoff = self.backoff_for(attempt);
        match error {
            ExecutorError::RateLimited {
                retry_after_ms: Some(hint),
            } => backoff.max(Duration::from_millis(*hint)),
            _ => backoff,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.call_timeout_ms == 0 {
            return Err("call_timeout_ms must be positive".to_string());
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("initial_backoff_ms must not exceed max_backoff_ms".to_string());
        }
        Ok(())
    }
}

/// Run `call` under the policy's timeout, retrying retryable failures.
///
/// Returns the value and the number of attempts it took. A final error
/// carries the attempt count via `ExecutorError::after_attempts`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut call: F,
) -> ExecutorResult<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExecutorResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.call_timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout {
                after_ms: policy.call_timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op, attempt, "Venue call succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(&e, attempt);
                warn!(
                    op,
                    attempt,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Venue call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.after_attempts(attempt)),
        }
    }
}
