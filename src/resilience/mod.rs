//! Retry, backoff, and timeout discipline shared by every fallible stage.
//!
//! Recoverable errors (see [`ProcessingError::is_recoverable`]) are retried
//! with exponential backoff; anything else propagates on the first failure.
//! Each attempt can be bounded by a per-call timeout, which surfaces as a
//! recoverable `ServiceUnavailable` error and is therefore retried too.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ErrorCategory, ProcessingError};
use crate::logging::redact::sanitize_error_message;

/// Default number of attempts, counting the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt` (1-based): `base_delay * 2^(attempt-1)`
    /// for retries, nothing for the first attempt, capped at `max_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
///
/// The closure receives the 1-based attempt number. After the last attempt
/// the final error is returned marked as exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ProcessingError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProcessingError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_recoverable() => {
                return Err(err.with_attempts(attempt));
            }
            Err(err) => {
                if attempt >= max_attempts {
                    warn!(
                        operation,
                        attempts = attempt,
                        category = %err.category(),
                        error = %sanitize_error_message(err.message()),
                        "retries exhausted"
                    );
                    return Err(err.exhausted_after(attempt));
                }
                attempt += 1;
                let delay = policy.delay_before(attempt);
                warn!(
                    operation,
                    next_attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    category = %err.category(),
                    error = %sanitize_error_message(err.message()),
                    "transient failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Bound a single call by `limit`; an elapsed timer becomes a recoverable
/// `ServiceUnavailable` error.
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    operation: &str,
    fut: Fut,
) -> Result<T, ProcessingError>
where
    Fut: Future<Output = Result<T, ProcessingError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProcessingError::service_unavailable(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Retry policy plus per-call timeout, applied to one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct Resilience {
    pub policy: RetryPolicy,
    pub call_timeout: Duration,
}

impl Resilience {
    pub fn new(policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            policy,
            call_timeout,
        }
    }

    /// Retry `op` with a timeout on every attempt, reporting a final service
    /// fault as a failure of `stage`.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        stage: ErrorCategory,
        mut op: F,
    ) -> Result<T, ProcessingError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProcessingError>>,
    {
        let limit = self.call_timeout;
        with_retry(&self.policy, operation, |attempt| {
            with_timeout(limit, operation, op(attempt))
        })
        .await
        .map_err(|e| e.attributed_to(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 40,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_before(10), Duration::from_secs(5));
        assert_eq!(policy.delay_before(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProcessingError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recoverable_error_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "op", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(ProcessingError::service_unavailable("flaky"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_recoverable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(3), "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProcessingError::validation("bad file")) }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.is_exhausted());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(3), "op", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ProcessingError::vision_transient(format!("failure {attempt}"))) }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.message(), "failure 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        };
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = with_retry(&policy, "op", |_| async {
            Err(ProcessingError::service_unavailable("down"))
        })
        .await;
        // 200ms before attempt 2, 400ms before attempt 3
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(700), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_elapsed_to_service_unavailable() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(1), "classify", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransientService);
        assert!(err.is_recoverable());
        assert!(err.message().contains("classify timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resilience_run_attributes_timeouts_to_stage() {
        let calls = Arc::new(AtomicU32::new(0));
        let resilience = Resilience::new(RetryPolicy::immediate(3), Duration::from_millis(50));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = resilience
            .run("classify", ErrorCategory::Vision, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.category(), ErrorCategory::Vision);
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
    }
}
