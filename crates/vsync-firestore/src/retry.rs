//! Retry of transient Firestore failures.
//!
//! Network errors, 429 and 5xx are retried with capped exponential backoff.
//! Failed preconditions and other client errors are returned at once, since
//! repeating them cannot change the outcome.

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_retry;

/// Retry policy for Firestore calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Read `FIRESTORE_MAX_RETRIES`, `FIRESTORE_RETRY_BASE_MS` and
    /// `FIRESTORE_RETRY_MAX_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_or("FIRESTORE_MAX_RETRIES", defaults.max_retries),
            base_delay_ms: env_or("FIRESTORE_RETRY_BASE_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("FIRESTORE_RETRY_MAX_MS", defaults.max_delay_ms),
        }
    }

    /// Delay before retry `attempt` (0-based). A server-requested delay wins;
    /// otherwise the capped exponential delay is spread over its upper half.
    fn backoff(&self, attempt: u32, err: &FirestoreError) -> Duration {
        if let FirestoreError::RateLimited(after_ms) = err {
            return Duration::from_millis(*after_ms);
        }

        let ceiling = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let spread = ceiling / 2;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_nanos()))
            .unwrap_or(0);
        let jitter = if spread > 0 { nanos % (spread + 1) } else { 0 };

        Duration::from_millis(ceiling - spread + jitter)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Run `op` until it succeeds, fails permanently or runs out of retries.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = FirestoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        let span = info_span!("firestore_attempt", operation = %operation, attempt = attempt + 1);
        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.backoff(attempt, &e);
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore call failed, retrying: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };
        let outage = FirestoreError::ServerError(503, "unavailable".into());

        let first = config.backoff(0, &outage);
        assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));

        let late = config.backoff(30, &outage);
        assert!(late >= Duration::from_millis(500) && late <= Duration::from_millis(1000));
    }

    #[test]
    fn test_rate_limit_delay_is_honored() {
        let delay = RetryConfig::default().backoff(0, &FirestoreError::RateLimited(2000));
        assert_eq!(delay, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_failed_precondition_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&fast(), "update_video", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FirestoreError::PreconditionFailed("videos/v1".into())) }
        })
        .await;

        assert!(matches!(result, Err(FirestoreError::PreconditionFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outage_is_retried_until_exhausted() {
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&fast(), "query_video_by_key", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FirestoreError::ServerError(503, "unavailable".into())) }
        })
        .await;

        assert!(matches!(result, Err(FirestoreError::ServerError(503, _))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "query_video_by_key", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FirestoreError::RateLimited(1))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
    }
}
