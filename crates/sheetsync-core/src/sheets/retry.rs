//! Retry with exponential backoff for spreadsheet calls
//!
//! Rate limits and timeouts from the spreadsheet provider are retried with
//! exponential backoff plus jitter; every other failure is returned at once.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry behavior for one provider call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configured attempts and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Default::default()
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * 2f64.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let with_jitter = if self.jitter {
            capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped
        };

        Duration::from_secs_f64(with_jitter)
    }
}

/// Retry classification for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retry after a server-provided delay (Retry-After)
    RetryAfter(Duration),
    NoRetry,
}

/// Errors that know whether they are worth retrying
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Run an async operation under a retry policy
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = match err.retry_decision() {
            RetryDecision::NoRetry => {
                debug!(operation, attempt, "Not retrying: {}", err);
                return Err(err);
            }
            _ if attempt >= policy.max_attempts => {
                warn!(operation, attempts = attempt, "Giving up: {}", err);
                return Err(err);
            }
            RetryDecision::RetryAfter(d) => d.min(policy.max_delay),
            RetryDecision::Retry => policy.delay_for(attempt - 1),
        };

        warn!(
            operation,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            err
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct FlakyError {
        retryable: bool,
    }

    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "FlakyError(retryable={})", self.retryable)
        }
    }

    impl RetryableError for FlakyError {
        fn retry_decision(&self) -> RetryDecision {
            if self.retryable {
                RetryDecision::Retry
            } else {
                RetryDecision::NoRetry
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..20 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(625));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<&str, FlakyError> = with_retry(&fast_policy(3), "read", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(FlakyError { retryable: true })
                } else {
                    Ok("rows")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), FlakyError> = with_retry(&fast_policy(3), "read", || {
            calls.set(calls.get() + 1);
            async { Err(FlakyError { retryable: true }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), FlakyError> = with_retry(&fast_policy(3), "read", || {
            calls.set(calls.get() + 1);
            async { Err(FlakyError { retryable: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
