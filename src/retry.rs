// Retry executor - bounded attempts with a fixed delay between them.
//
// RPC endpoints used here are bursty and rate-limit tolerant, so the delay
// stays constant: no jitter, no exponential growth. The loop is written out
// rather than built on `backoff`, which bounds retries by elapsed time only;
// here the bound is an attempt count.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::RetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// Every failed attempt is logged with its attempt number. There is no sleep
/// after the final attempt; exhaustion yields `RetryError::Exhausted` with the
/// last underlying error message.
pub async fn run_with_retry<T, E, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %last_error,
                    "⚠️ Attempt failed"
                );

                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(RetryError::Exhausted {
        operation: operation.to_string(),
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = run_with_retry("flaky", fast_policy(3), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("failure {}", n))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = run_with_retry("always_down", fast_policy(4), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("down #{}", n))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(RetryError::Exhausted {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "always_down");
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "down #4");
            }
            Ok(_) => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };

        let _ = run_with_retry("once", policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("nope")
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_sleep_after_final_attempt() {
        let policy = RetryPolicy::new(1, Duration::from_secs(3600));
        let started = std::time::Instant::now();

        let result: Result<(), _> =
            run_with_retry("single", policy, || async { Err("boom") }).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
