//! Retry middleware with exponential backoff and jitter.
//!
//! The pipeline never retries on its own; install [`RetryMiddleware`] to
//! repeat exchanges that failed with a transport error or a transient status
//! (502, 503, 504).

use super::middleware::{Middleware, Next};
use super::transport::{HttpRequest, HttpResponse};
use crate::config::ClientConfig;
use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule for [`RetryMiddleware`].
///
/// The delay doubles with every attempt, starting at `base_delay` and never
/// exceeding `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total exchanges allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in [0.5, 1.5).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: ClientConfig::MAX_RETRIES,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause before retrying after the zero-based `attempt` failed.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        let delay = doubled.min(self.max_delay);
        if !self.jitter {
            return delay;
        }
        let factor: f64 = rand::rng().random_range(0.5..1.5);
        delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Status codes worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// Repeats the rest of the pipeline on transient failures.
#[derive(Debug, Clone, Default)]
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = next.run(request.clone()).await;
            let transient = match &result {
                Ok(response) => is_retryable_status(response.status),
                Err(e) => e.is_retryable(),
            };

            if !transient {
                if attempt > 0 {
                    debug!("{} {} settled after {} attempts", request.verb, request.path, attempt + 1);
                }
                return result;
            }
            if attempt + 1 >= attempts {
                warn!(
                    "{} {} still failing after {} attempts",
                    request.verb, request.path, attempts
                );
                return result;
            }

            let delay = self.config.calculate_delay(attempt);
            match &result {
                Ok(response) => warn!(
                    "{} {} answered {} (attempt {}/{}), retrying in {:?}",
                    request.verb,
                    request.path,
                    response.status,
                    attempt + 1,
                    attempts,
                    delay
                ),
                Err(e) => warn!(
                    "{} {} failed (attempt {}/{}): {}, retrying in {:?}",
                    request.verb,
                    request.path,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                ),
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::Transport;
    use crate::error::RpcError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails with the scripted outcomes, then succeeds.
    struct FlakyTransport {
        calls: AtomicU32,
        failures: Vec<Option<u16>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(call) {
                Some(Some(status)) => Ok(HttpResponse::new(*status, "")),
                Some(None) => Err(RpcError::Transport {
                    message: "connection reset".into(),
                    source: None,
                }),
                None => Ok(HttpResponse::new(200, "ok")),
            }
        }
    }

    fn fast_retry(attempts: u32) -> Vec<Arc<dyn Middleware>> {
        let config = RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay(Duration::from_millis(10))
            .with_jitter(false);
        vec![Arc::new(RetryMiddleware::new(config))]
    }

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(5), Duration::from_secs(30));
        assert_eq!(config.calculate_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(60));
        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            failures: vec![None, Some(503)],
        };
        let middleware = fast_retry(3);
        let response = Next::new(&middleware, &transport)
            .run(HttpRequest::default())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            failures: vec![Some(502); 5],
        };
        let middleware = fast_retry(2);
        let response = Next::new(&middleware, &transport)
            .run(HttpRequest::default())
            .await
            .unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            failures: vec![Some(404)],
        };
        let middleware = fast_retry(3);
        let response = Next::new(&middleware, &transport)
            .run(HttpRequest::default())
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
