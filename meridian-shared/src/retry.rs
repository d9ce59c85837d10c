//! Uniform in-process retry loop used by every department worker. Distinct
//! from the circuit breaker: a breaker rejects outright when a dependency
//! is known-bad, this loop retries a single message delivery a bounded
//! number of times before giving up.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first, non-retry attempt.
    pub max_attempts: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `delay = min(2^(n-1) + jitter_uniform(0,1), max_delay)` seconds, for
    /// the n-th retry attempt (n >= 1, i.e. the attempt *after* the first).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = 2f64.powi(attempt as i32 - 1);
        let jitter = fastrand::f64();
        let seconds = (base + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }
}

pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: E, attempts: u32 },
}

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts
/// per [`RetryPolicy::backoff`]. `op` is called with the 1-based attempt
/// number so the caller can update `AgentTask.retry_count` /
/// `status=retrying` bookkeeping between attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts: attempt },
            Err(error) => {
                if attempt >= policy.max_attempts {
                    return RetryOutcome::Exhausted { error, attempts: attempt };
                }
                let delay = policy.backoff(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_and_grows() {
        let policy = RetryPolicy::default();
        for n in 1..=6 {
            let d = policy.backoff(n);
            let base = 2f64.powi(n as i32 - 1);
            assert!(d.as_secs_f64() <= 30.0);
            assert!(d.as_secs_f64() >= base.min(30.0));
        }
    }

    #[test]
    fn max_retries_excludes_first_attempt() {
        assert_eq!(RetryPolicy::default().max_retries(), 5);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_delay: Duration::from_millis(5),
        };
        let mut calls = 0;
        let outcome = retry_with_backoff(&policy, |attempt| {
            calls += 1;
            async move {
                if attempt < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                assert_eq!(value, 42);
                assert_eq!(attempts, 2);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected success"),
        }
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            max_delay: Duration::from_millis(5),
        };
        let outcome = retry_with_backoff(&policy, |_attempt| async move { Err::<(), _>("always fails") }).await;
        match outcome {
            RetryOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
            RetryOutcome::Succeeded { .. } => panic!("expected exhaustion"),
        }
    }
}
