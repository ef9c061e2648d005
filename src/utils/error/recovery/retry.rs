//! Retry mechanism with exponential backoff

use crate::config::RetryConfig;
use crate::utils::error::{DispatchError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry mechanism with exponential backoff and jitter
///
/// Only errors reporting [`DispatchError::is_retryable`] are retried; everything
/// else is returned on first occurrence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .config
            .base_delay()
            .saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.config.max_delay())
    }

    /// Backoff with up to 10% random jitter added on top
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_backoff(attempt);
        if !self.config.jitter {
            return delay;
        }

        let jitter = delay.as_secs_f64() * 0.1 * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter)
    }

    /// Delay before retrying after `error`, honoring the server's wait hint up to the cap
    pub fn delay_for(&self, attempt: u32, error: &DispatchError) -> Duration {
        let backoff = self.backoff(attempt);
        match error {
            DispatchError::Throttled { retry_after, .. } => {
                backoff.max((*retry_after).min(self.config.max_delay()))
            }
            _ => backoff,
        }
    }

    /// Execute a function with retry logic
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn call<F, Fut, R>(&self, mut f: F) -> Result<R>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<R>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Retry succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        "Attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    if error.is_retryable() {
                        warn!("Giving up after {} attempts: {}", attempt, error);
                    }
                    return Err(error.with_attempts(attempt));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter,
        })
    }

    fn throttled(retry_after: Duration) -> DispatchError {
        DispatchError::Throttled {
            endpoint: "/orders/1".to_string(),
            group: "order_detail".to_string(),
            message: "slow down".to_string(),
            retry_after,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy(5, false);
        assert_eq!(policy.base_backoff(1), Duration::from_millis(100));
        assert_eq!(policy.base_backoff(2), Duration::from_millis(200));
        assert_eq!(policy.base_backoff(3), Duration::from_millis(400));
        assert_eq!(policy.base_backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.base_backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = policy(5, true);
        for attempt in 1..=5 {
            let base = policy.base_backoff(attempt);
            for _ in 0..50 {
                let delay = policy.backoff(attempt);
                assert!(delay >= base);
                assert!(delay <= base + base / 10);
            }
        }
    }

    #[test]
    fn test_throttle_hint_raises_delay_up_to_cap() {
        let policy = policy(5, false);
        let short = policy.delay_for(1, &throttled(Duration::from_millis(300)));
        assert_eq!(short, Duration::from_millis(300));

        let long = policy.delay_for(1, &throttled(Duration::from_secs(120)));
        assert_eq!(long, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_retryable_errors_until_success() {
        let policy = policy(3, true);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = policy
            .call(|_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(DispatchError::queue_timeout(
                            "reports",
                            Duration::from_secs(5),
                            Duration::from_secs(1),
                        ))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_queue_timeout_reports_attempts() {
        let policy = policy(3, false);

        let result: Result<()> = policy
            .call(|_| async {
                Err(DispatchError::queue_timeout(
                    "reports",
                    Duration::from_secs(5),
                    Duration::from_secs(1),
                ))
            })
            .await;

        match result {
            Err(DispatchError::QueueTimeout {
                group, attempts, ..
            }) => {
                assert_eq!(group, "reports");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_errors_are_not_retried() {
        let policy = policy(5, false);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<()> = policy
            .call(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(DispatchError::AuthFailed {
                        endpoint: "/orders".to_string(),
                        group: "order_list".to_string(),
                        status: 403,
                        message: "denied".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
