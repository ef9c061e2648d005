//! Per-group rate limit configuration

use super::types::{RateLimitConfig, burst_from_f64};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Group every unmatched endpoint falls into
pub const DEFAULT_GROUP: &str = "default";

/// Built-in limits, `(group, rate, burst)`
const BUILTIN_LIMITS: &[(&str, f64, u32)] = &[
    ("order_list", 0.0167, 20),
    ("order_detail", 0.5, 30),
    ("order_address", 0.5, 30),
    ("order_buyer_info", 0.5, 30),
    ("invoice_list", 0.1, 10),
    ("invoice_detail", 0.5, 30),
    ("listings", 5.0, 10),
    ("reports", 0.0222, 10),
    ("report_detail", 2.0, 15),
    ("feeds", 0.0083, 15),
    ("tokens", 1.0, 10),
    (DEFAULT_GROUP, 1.0, 5),
];

/// External source of JSON rate limit overrides
///
/// Read on every lookup, so a changed value takes effect on the next call.
pub trait OverrideSource: Send + Sync {
    fn read(&self) -> Option<String>;
}

impl<F> OverrideSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn read(&self) -> Option<String> {
        self()
    }
}

/// Reads overrides from an environment variable
#[derive(Debug, Clone)]
pub struct EnvOverrideSource {
    key: String,
}

impl EnvOverrideSource {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl OverrideSource for EnvOverrideSource {
    fn read(&self) -> Option<String> {
        std::env::var(&self.key).ok()
    }
}

#[derive(Debug, Deserialize)]
struct PartialLimit {
    rate: Option<f64>,
    burst: Option<f64>,
}

/// Rate limit configuration per group
#[derive(Clone)]
pub struct RateLimitRegistry {
    defaults: HashMap<String, RateLimitConfig>,
    overrides: Option<Arc<dyn OverrideSource>>,
}

impl fmt::Debug for RateLimitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitRegistry")
            .field("defaults", &self.defaults)
            .field("overrides", &self.overrides.is_some())
            .finish()
    }
}

impl Default for RateLimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitRegistry {
    /// Registry with the built-in limits and no override source
    pub fn new() -> Self {
        let defaults = BUILTIN_LIMITS
            .iter()
            .map(|&(group, rate, burst)| (group.to_string(), RateLimitConfig { rate, burst }))
            .collect();
        Self {
            defaults,
            overrides: None,
        }
    }

    /// Registry without any built-in limits
    pub fn empty() -> Self {
        Self {
            defaults: HashMap::new(),
            overrides: None,
        }
    }

    pub fn with_default(mut self, group: impl Into<String>, config: RateLimitConfig) -> Self {
        self.defaults.insert(group.into(), config);
        self
    }

    pub fn with_override_source(mut self, source: Arc<dyn OverrideSource>) -> Self {
        self.overrides = Some(source);
        self
    }

    /// Configuration for `group`, with overrides applied
    ///
    /// Unknown groups get the `default` group's configuration.
    pub fn get_config(&self, group: &str) -> RateLimitConfig {
        let base = self.base_config(group);
        let Some(overrides) = self.read_overrides() else {
            return base;
        };

        let key = if overrides.contains_key(group) || self.defaults.contains_key(group) {
            group
        } else {
            DEFAULT_GROUP
        };
        match overrides.get(key) {
            Some(partial) => merge(key, base, partial),
            None => base,
        }
    }

    pub fn validate(config: &RateLimitConfig) -> bool {
        config.is_valid()
    }

    /// Groups with a built-in configuration
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    fn base_config(&self, group: &str) -> RateLimitConfig {
        self.defaults
            .get(group)
            .or_else(|| self.defaults.get(DEFAULT_GROUP))
            .copied()
            .unwrap_or(RateLimitConfig::FALLBACK)
    }

    fn read_overrides(&self) -> Option<HashMap<String, PartialLimit>> {
        let raw = self.overrides.as_ref()?.read()?;
        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Ignoring malformed rate limit overrides: {}", e);
                None
            }
        }
    }
}

fn merge(group: &str, base: RateLimitConfig, partial: &PartialLimit) -> RateLimitConfig {
    let rate = partial.rate.unwrap_or(base.rate);
    let burst = match partial.burst {
        Some(burst) => match burst_from_f64(burst) {
            Some(burst) => burst,
            None => {
                warn!(group, burst, "Ignoring rate limit override with invalid burst");
                return base;
            }
        },
        None => base.burst,
    };

    let merged = RateLimitConfig { rate, burst };
    if !merged.is_valid() {
        warn!(group, rate, burst, "Ignoring invalid rate limit override");
        return base;
    }

    debug!(group, rate, burst, "Applied rate limit override");
    merged
}
