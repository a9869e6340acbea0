//! Retry classification and exponential backoff for direct fetches.

use std::future::Future;
use std::time::Duration;

/// Base delay of the backoff schedule; attempt `n` waits `2^n` times this.
const BACKOFF_BASE_MS: u64 = 1000;

/// How a fetch attempt failed. Retryability is decided on this alone; the
/// delay schedule never depends on which condition triggered it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),
}

impl FetchFailure {
    /// Network-class failures, timeouts, 429, and 5xx are worth retrying;
    /// every other status (and any success) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailure::Network(_) | FetchFailure::Timeout => true,
            FetchFailure::Status(429) => true,
            FetchFailure::Status(code) => (500..600).contains(code),
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchFailure::Timeout
        } else if let Some(status) = err.status() {
            FetchFailure::Status(status.as_u16())
        } else {
            FetchFailure::Network(err.to_string())
        }
    }
}

/// Run `op` up to `max_attempts` times, sleeping 1 s, 2 s, 4 s... between
/// retryable failures. Non-retryable failures propagate immediately; after
/// exhaustion the last failure propagates.
pub async fn with_backoff<T, F, Fut>(mut op: F, max_attempts: u32) -> Result<T, FetchFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchFailure>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.is_retryable() && attempt + 1 < max_attempts => {
                let delay = Duration::from_millis(BACKOFF_BASE_MS << attempt);
                tracing::debug!(attempt, ?delay, "retryable failure: {failure}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Cap `fut` to `budget`; exceeding it counts as a retryable timeout.
pub async fn with_timeout<T>(
    budget: Duration,
    fut: impl Future<Output = Result<T, FetchFailure>>,
) -> Result<T, FetchFailure> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchFailure::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_classification() {
        assert!(FetchFailure::Network("reset".to_string()).is_retryable());
        assert!(FetchFailure::Timeout.is_retryable());
        assert!(FetchFailure::Status(429).is_retryable());
        assert!(FetchFailure::Status(500).is_retryable());
        assert!(FetchFailure::Status(503).is_retryable());
        assert!(!FetchFailure::Status(404).is_retryable());
        assert!(!FetchFailure::Status(403).is_retryable());
        assert!(!FetchFailure::Status(400).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_1s_then_2s() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_backoff(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(FetchFailure::Status(500))
                } else {
                    Ok("done")
                }
            },
            3,
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_without_waiting() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchFailure::Status(404))
            },
            3,
        )
        .await;

        assert_eq!(result, Err(FetchFailure::Status(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_failure() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchFailure::Timeout)
            },
            3,
        )
        .await;

        assert_eq!(result, Err(FetchFailure::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_budget_maps_to_retryable() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(FetchFailure::Timeout));
        assert!(result.unwrap_err().is_retryable());
    }
}
