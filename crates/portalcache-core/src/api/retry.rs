//! Retry decisions and exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ApiError;

/// Total attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base unit of the backoff; the delay after attempt `a` is `2^a` of these.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(DEFAULT_BASE_DELAY_MS))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Network failures, timeouts and gateway-class statuses are transient.
    pub fn is_retryable(err: &ApiError) -> bool {
        match err {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Http { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && Self::is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn http(status: u16) -> ApiError {
        ApiError::Http {
            status,
            message: format!("HTTP {status}"),
            errors: vec![],
        }
    }

    #[test]
    fn test_retryable_classes() {
        assert!(RetryPolicy::is_retryable(&http(502)));
        assert!(RetryPolicy::is_retryable(&http(503)));
        assert!(RetryPolicy::is_retryable(&http(504)));
        assert!(RetryPolicy::is_retryable(&ApiError::Timeout(Duration::from_secs(1))));
        let transport = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(RetryPolicy::is_retryable(&ApiError::Network(transport)));
        assert!(!RetryPolicy::is_retryable(&http(500)));
        assert!(!RetryPolicy::is_retryable(&http(404)));
        assert!(!RetryPolicy::is_retryable(&ApiError::Unauthorized {
            message: String::new(),
            errors: vec![]
        }));
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_then_success() {
        let policy = RetryPolicy::default();
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result = policy
            .run(|attempt| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((attempt, start.elapsed()));
                    if attempt < 3 {
                        Err(http(503))
                    } else {
                        Ok("payload")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "payload");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (1, Duration::ZERO));
        assert_eq!(seen[1], (2, Duration::from_secs(2)));
        assert_eq!(seen[2], (3, Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_without_trailing_delay() {
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let result: Result<(), ApiError> = policy
            .run(|attempt| async move { Err(http(500 + attempt as u16 + 1)) })
            .await;

        // 502, 503, then 504 is the final error.
        assert_eq!(result.unwrap_err().status(), Some(504));
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(Mutex::new(0));

        let result: Result<(), ApiError> = policy
            .run(|_| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Err(http(400))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_is_retried_until_exhausted() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let client = reqwest::Client::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = Arc::new(Mutex::new(0));

        let result = policy
            .run(|_| {
                let calls = calls.clone();
                let request = client.get(&url);
                async move {
                    *calls.lock().unwrap() += 1;
                    request.send().await.map_err(ApiError::Network)
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
