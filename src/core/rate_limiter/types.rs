//! Rate limiter types and data structures

use crate::utils::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;

/// Refill rate and capacity of one group's bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Permits added per second
    pub rate: f64,
    /// Maximum bucket size
    pub burst: u32,
}

impl RateLimitConfig {
    /// Used when neither the group nor `default` has a configuration
    pub const FALLBACK: Self = Self {
        rate: 1.0,
        burst: 5,
    };

    pub fn new(rate: f64, burst: u32) -> Result<Self> {
        let config = Self { rate, burst };
        if !config.is_valid() {
            return Err(DispatchError::invalid_config(format!(
                "rate limit must have a finite rate > 0 and burst >= 1, got {}:{}",
                rate, burst
            )));
        }
        Ok(config)
    }

    pub fn is_valid(&self) -> bool {
        self.rate.is_finite() && self.rate > 0.0 && self.burst >= 1
    }

    /// Parse a `<rate>:<burst>` descriptor, as sent in the adaptive header
    ///
    /// Returns `None` for anything that is not exactly two numbers forming a
    /// valid configuration.
    pub fn parse_descriptor(value: &str) -> Option<Self> {
        let (rate, burst) = value.trim().split_once(':')?;
        let rate: f64 = rate.trim().parse().ok()?;
        let burst = burst_from_f64(burst.trim().parse().ok()?)?;
        let config = Self { rate, burst };
        config.is_valid().then_some(config)
    }

    /// Seconds until one permit is refilled
    pub fn permit_interval_secs(&self) -> f64 {
        1.0 / self.rate
    }
}

/// Whole, finite, positive burst values only
pub(super) fn burst_from_f64(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Token bucket state for one group
#[derive(Debug, Clone)]
pub struct TokenBucket {
    pub tokens: f64,
    pub max_tokens: u32,
    pub refill_rate: f64,
    pub last_refill_at: Instant,
}

impl TokenBucket {
    /// Full bucket for `config`
    pub fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.burst as f64,
            max_tokens: config.burst,
            refill_rate: config.rate,
            last_refill_at: now,
        }
    }

    /// Add what accrued since the last refill, never exceeding `max_tokens`
    pub fn refill(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill_at);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens as f64);
        self.last_refill_at = now;
        self.tokens
    }

    /// Tokens as they would be after a refill at `now`, without mutating
    pub fn peek(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill_at);
        (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens as f64)
    }

    pub fn try_consume(&mut self, n: f64) -> bool {
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Switch to a new configuration, clamping tokens to the new capacity
    pub fn reconfigure(&mut self, config: &RateLimitConfig) {
        self.max_tokens = config.burst;
        self.refill_rate = config.rate;
        self.tokens = self.tokens.min(config.burst as f64);
    }
}

/// Snapshot of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMetrics {
    pub tokens: f64,
    pub max_tokens: u32,
    pub queue_length: usize,
    /// Callers that had to queue since the group was created
    pub rate_limit_hits: u64,
}

/// Snapshot of the whole limiter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LimiterMetrics {
    /// Callers queued across all groups
    pub queue_length: usize,
    /// Groups with a bucket
    pub active_groups: usize,
    pub per_group: HashMap<String, GroupMetrics>,
}
