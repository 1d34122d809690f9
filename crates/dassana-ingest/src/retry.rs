//! Fixed-delay retry wrapper shared by every outbound call

use crate::error::{IngestError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Retry Constants
// ============================================================================

/// Attempts made for each network call, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed pause between attempts. No backoff, no jitter.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same attempt budget with no pause, for tests and local tooling.
    pub fn immediate() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::ZERO)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            },
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("{} attempt {}/{} failed: {}", operation, attempt, attempts, e);
                last_error = Some(e);

                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            },
        }
    }

    Err(last_error.unwrap_or_else(|| {
        IngestError::internal(operation, "retry loop finished without an attempt")
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> IngestError {
        IngestError::Io(std::io::Error::other("connection reset"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_delay_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<()> = with_retry(&RetryPolicy::default(), "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = AtomicU32::new(0);

        let value = with_retry(&RetryPolicy::immediate(), "fetch", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_classified_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryPolicy::immediate(), "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(IngestError::internal("job", "rejected"))
        })
        .await;

        assert!(matches!(result, Err(IngestError::Internal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO);

        let _ = with_retry(&policy, "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, IngestError>(())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
