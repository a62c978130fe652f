//! Retry with exponential backoff and jitter for transient failures

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Maximum jitter as a fraction of the delay
    pub max_jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_jitter: 0.1,
        }
    }
}

/// Execute an operation, retrying retryable errors per the policy.
///
/// Non-retryable errors are surfaced immediately; the last error is returned
/// once attempts are exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut current_delay = policy.base_delay;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        debug!(
            operation = operation_name,
            attempt,
            max_attempts = policy.max_attempts,
            "executing operation"
        );

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => {
                warn!(
                    operation = operation_name,
                    error = %e,
                    "operation failed with non-retryable error"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "operation failed, will retry"
                );
                last_error = Some(e);
            }
        }

        if attempt < policy.max_attempts {
            let delay = add_jitter(current_delay, policy.max_jitter);
            debug!(operation = operation_name, ?delay, "waiting before retry");
            sleep(delay).await;

            current_delay = Duration::from_millis(
                ((current_delay.as_millis() as f64) * policy.backoff_multiplier) as u64,
            )
            .min(policy.max_delay);
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Internal(format!("{operation_name}: no error recorded"))))
}

fn add_jitter(delay: Duration, max_jitter: f64) -> Duration {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    // Thread id as seed: varied across workers without a rand dependency
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    let seed = hasher.finish();

    let random = ((seed.wrapping_mul(1_103_515_245).wrapping_add(12_345)) >> 16) & 0x7fff;
    let jitter_factor = (random as f64 / 32_767.0) * max_jitter;

    let delay_ms = delay.as_millis() as f64;
    Duration::from_millis((delay_ms + delay_ms * jitter_factor) as u64)
}
