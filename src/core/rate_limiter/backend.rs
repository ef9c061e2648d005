//! Token accounting backends

use super::types::{RateLimitConfig, TokenBucket};
use crate::utils::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

/// Storage for per-group token counts
///
/// The limiter only ever talks to buckets through this trait, so a shared
/// store can stand in for the in-process one without changing what callers
/// observe. Buckets are created full on first use.
#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Tokens currently available, including what accrued since the last refill
    async fn get_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64>;

    /// Take `n` tokens if that many are available
    async fn consume_tokens(&self, group: &str, config: &RateLimitConfig, n: f64) -> Result<bool>;

    /// Apply the accrued refill and return the new count, clamped to `config.burst`
    async fn refill_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// In-process buckets, one per group
#[derive(Debug, Default)]
pub struct LocalTokenBackend {
    buckets: DashMap<String, TokenBucket>,
}

impl LocalTokenBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bucket<T>(
        &self,
        group: &str,
        config: &RateLimitConfig,
        f: impl FnOnce(&mut TokenBucket, Instant) -> T,
    ) -> T {
        let now = Instant::now();
        let mut bucket = match self.buckets.get_mut(group) {
            Some(bucket) => bucket,
            None => self
                .buckets
                .entry(group.to_string())
                .or_insert_with(|| TokenBucket::new(config, now)),
        };
        if bucket.max_tokens != config.burst || bucket.refill_rate != config.rate {
            // Accrue at the old rate up to now, then switch and clamp
            bucket.refill(now);
            bucket.reconfigure(config);
        }
        f(&mut bucket, now)
    }
}

#[async_trait]
impl TokenBackend for LocalTokenBackend {
    async fn get_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64> {
        Ok(self.with_bucket(group, config, |bucket, now| bucket.peek(now)))
    }

    async fn consume_tokens(&self, group: &str, config: &RateLimitConfig, n: f64) -> Result<bool> {
        Ok(self.with_bucket(group, config, |bucket, now| {
            bucket.refill(now);
            bucket.try_consume(n)
        }))
    }

    async fn refill_tokens(&self, group: &str, config: &RateLimitConfig) -> Result<f64> {
        Ok(self.with_bucket(group, config, |bucket, now| bucket.refill(now)))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
