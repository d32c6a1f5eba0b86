//! Deadlines and bounded in-request retries for external calls
//!
//! Every network round trip in the crate goes through [`with_timeout`]. Transient
//! failures may additionally be retried in place with [`retry_linear`], which never
//! runs more than [`MAX_IMMEDIATE_ATTEMPTS`] attempts. Anything longer belongs to the
//! scheduled dead-letter retry sweep.

use crate::error::{Result, SearchError};
use std::future::Future;
use std::time::Duration;

/// Hard ceiling on in-request attempts, including the first one
pub const MAX_IMMEDIATE_ATTEMPTS: usize = 3;

/// Default linear backoff step between in-request attempts
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Run `future` under a deadline, mapping expiry to [`SearchError::Timeout`]
pub async fn with_timeout<T, F>(operation: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout {
            operation: operation.to_string(),
            duration,
        }),
    }
}

/// Linear backoff policy for immediate retries
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts to make, clamped to `1..=MAX_IMMEDIATE_ATTEMPTS`
    pub max_attempts: usize,
    /// Delay added per completed attempt (step, 2 x step, ...)
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_IMMEDIATE_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_step: Duration::ZERO,
        }
    }

    /// Attempts this policy will actually make
    pub fn effective_attempts(&self) -> usize {
        self.max_attempts.clamp(1, MAX_IMMEDIATE_ATTEMPTS)
    }

    /// Delay before attempt number `attempt + 1`, given `attempt` failures so far
    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff_step * attempt as u32
    }
}

/// Retry `operation` while `is_retryable` approves the error, with linear backoff
pub async fn retry_linear<T, E, F, Fut, P>(
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> std::result::Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = policy.effective_attempts();
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_retryable(&err) => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        match result {
            Err(SearchError::Timeout { operation, .. }) => assert_eq!(operation, "slow call"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_at_ceiling() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_step: Duration::from_millis(1),
        };

        let result: Result<()> = retry_linear(policy, |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SearchError::EmbeddingGeneration("503".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_IMMEDIATE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1),
        };

        let result = retry_linear(policy, SearchError::is_transient, |attempt| async move {
            if attempt < 2 {
                Err(SearchError::EmbeddingGeneration("429".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_linear(RetryPolicy::default(), SearchError::is_transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SearchError::Validation("bad input".into())) }
        })
        .await;

        assert!(matches!(result, Err(SearchError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(2), Duration::from_millis(100));
        assert_eq!(RetryPolicy::none().effective_attempts(), 1);
    }
}
