//! Retry with exponential backoff and full jitter for venue REST calls.
//!
//! Transient network faults and 5xx/429 responses get retried under a
//! bounded policy; anything that looks like a client error fails fast so a
//! bad order request is never re-submitted blindly.

use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Hard wall-clock bound across all attempts.
    pub max_elapsed_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1500,
            max_elapsed_ms: 4000,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_attempts: env_u64("RETRY_MAX_ATTEMPTS")
                .filter(|&n| n > 0 && n <= 10)
                .map(|n| n as u32)
                .unwrap_or(d.max_attempts),
            base_delay_ms: env_u64("RETRY_BASE_DELAY_MS")
                .filter(|&n| n > 0)
                .unwrap_or(d.base_delay_ms),
            max_delay_ms: env_u64("RETRY_MAX_DELAY_MS")
                .filter(|&n| n > 0)
                .unwrap_or(d.max_delay_ms),
            max_elapsed_ms: env_u64("RETRY_MAX_ELAPSED_MS")
                .filter(|&n| n > 0)
                .unwrap_or(d.max_elapsed_ms),
        }
    }

    /// Exponential delay capped at `max_delay_ms`, before jitter.
    fn ceiling_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let multiplier = if exponent >= 32 {
            u64::MAX
        } else {
            1u64 << exponent
        };
        self.base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms)
    }

    /// Full jitter: uniform in [0, ceiling).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let cap = self.ceiling_ms(attempt);
        if cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..cap)
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Whether a failed call is worth trying again.
///
/// Retryable: network/timeout faults and HTTP 408, 425, 429, 5xx. Everything
/// else in the 4xx range is a client error and fails fast.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(req) = err.downcast_ref::<reqwest::Error>() {
        if let Some(status) = req.status() {
            return matches!(status.as_u16(), 408 | 425 | 429 | 500..=599);
        }
        return req.is_timeout() || req.is_connect() || req.is_request();
    }
    // Errors without HTTP context are assumed transient.
    true
}

/// Run `operation` under `policy`, sleeping with jittered backoff between
/// attempts. The final error is returned unchanged once the budget is spent.
pub async fn retry_async<T, Fut, F>(policy: &RetryPolicy, op_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = std::time::Instant::now();
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "retry op={} recovered on attempt {} ({}ms)",
                        op_name,
                        attempt,
                        start.elapsed().as_millis()
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    debug!("retry op={} non-retryable: {}", op_name, err);
                    return Err(err);
                }
                let elapsed_ms = start.elapsed().as_millis() as u64;
                if attempt >= policy.max_attempts || elapsed_ms >= policy.max_elapsed_ms {
                    warn!(
                        "retry op={} exhausted after {} attempts ({}ms): {}",
                        op_name, attempt, elapsed_ms, err
                    );
                    return Err(err);
                }

                let remaining = policy.max_elapsed_ms.saturating_sub(elapsed_ms);
                let backoff = policy.backoff_ms(attempt).min(remaining);
                debug!(
                    "retry op={} attempt={} backoff_ms={}: {}",
                    op_name, attempt, backoff, err
                );
                if backoff > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling_ms(1), 100);
        assert_eq!(policy.ceiling_ms(2), 200);
        assert_eq!(policy.ceiling_ms(3), 400);
        assert_eq!(policy.ceiling_ms(4), 800);
        assert_eq!(policy.ceiling_ms(5), 1500);
        assert_eq!(policy.ceiling_ms(40), 1500);
    }

    #[test]
    fn test_jitter_stays_under_ceiling() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert!(policy.backoff_ms(3) < 400);
        }
    }

    #[test]
    fn test_plain_errors_are_retryable() {
        assert!(is_retryable(&anyhow::anyhow!("connection reset")));
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_elapsed_ms: 1000,
        };
        let mut calls = 0;
        let result = retry_async(&policy, "test_op", || {
            calls += 1;
            async move {
                if calls < 2 {
                    anyhow::bail!("transient");
                }
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_elapsed_ms: 1000,
        };
        let mut calls = 0;
        let result: Result<i32> = retry_async(&policy, "test_op", || {
            calls += 1;
            async move { anyhow::bail!("still down") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
