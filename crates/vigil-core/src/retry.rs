//! Bounded retry with exponential backoff.
//!
//! Every collaborator call made from a monitoring cycle goes through
//! [`retry`]: each attempt is bounded by a timeout, a timeout counts as a
//! retryable failure, and non-retryable errors return immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry configuration for one class of collaborator call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up (default: 3)
    pub max_attempts: u32,
    /// Delay after the first failure; doubled per attempt (default: 2000)
    pub base_delay_ms: u64,
    /// Upper bound on a single delay (default: 30000)
    pub max_delay_ms: u64,
    /// Timeout applied to each attempt (default: 10)
    pub attempt_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            attempt_timeout_secs: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.min(63));
        let delay = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// Run `f` under `policy`.
///
/// Backoff sleeps observe `cancel`; a cancelled retry returns the last error
/// without further attempts.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    cancel: Option<&CancellationToken>,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = Error::Other(format!("{op_name}: no attempt made"));

    for attempt in 0..attempts {
        let outcome = match tokio::time::timeout(policy.attempt_timeout(), f()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.attempt_timeout_secs)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(op = op_name, attempt = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(op = op_name, attempt = attempt + 1, max = attempts, error = %e, "Attempt failed");
                last_error = e;
            }
        }

        if attempt + 1 < attempts {
            let delay = policy.delay_for(attempt);
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(last_error),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    Err(last_error)
}
