//! Exponential backoff for remote calls.
//!
//! Every remote call site (duplicate search, ticket view, ticket creation,
//! file upload) goes through [`with_retry`] so the backoff schedule is the
//! same everywhere:
//!
//! ```text
//! delay(attempt) = base * 2^attempt + jitter,   jitter in [0, max_jitter]
//! ```
//!
//! Only errors accepted by the predicate are retried; anything else is
//! returned to the caller on the first failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::RetryConfig;

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Same attempt count, no waiting. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (0-based),
    /// without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Backoff plus a random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned in the latter two cases.
pub async fn with_retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&AppError) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    operation,
                    attempt + 1,
                    policy.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    log::debug!("{} gave up after {} attempts", operation, attempt + 1);
                }
                return Err(e);
            }
        }
    }
}

/// [`with_retry`] using [`AppError::is_retryable`] as the predicate.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry(policy, operation, AppError::is_retryable, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::ZERO,
        };
        assert!(policy.backoff(64) >= policy.backoff(31));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_jitter: Duration::from_millis(5),
        };
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(15));
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryPolicy::immediate(5), "create", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::transient("create", "429"))
            } else {
                Ok("GAT-1")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "GAT-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&RetryPolicy::immediate(5), "create", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::permanent("create", 400, "bad field"))
        })
        .await;

        assert!(matches!(result, Err(AppError::PermanentRemote { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&RetryPolicy::immediate(3), "search", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::transient("search", format!("503 #{n}")))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().to_string().contains("#2"));
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            &RetryPolicy::immediate(4),
            "upload",
            |e| matches!(e, AppError::Validation(_)),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::validation("flaky"))
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
