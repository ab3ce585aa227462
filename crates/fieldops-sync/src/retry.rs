// File: fieldops-sync/src/retry.rs
// Purpose: Bounded exponential backoff over classified-transient failures

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Backoff policy: `base_delay * 2^attempt`, ±`jitter`, capped at
/// `max_delay`, at most `max_attempts` attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Relative jitter, e.g. 0.2 for ±20%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following a failed `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let raw = self
            .base_delay
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            .min(self.max_delay);

        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };

        raw.mul_f64(factor).min(self.max_delay.mul_f64(1.0 + self.jitter))
    }
}

/// Run `op`, retrying transient failures per the policy. Each attempt is a
/// fresh, independent call; no lock or transaction spans the backoff sleep.
/// Business outcomes return immediately. Exhausting the budget raises
/// `RetryExhausted` with the last error.
///
/// Retried pushes are naturally idempotent: an already-applied delta fails
/// the CAS etag check instead of double-applying, so no dedup store exists.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(SyncError::RetryExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                let delay = policy.backoff_delay(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
