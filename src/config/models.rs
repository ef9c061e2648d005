//! Configuration sections

use crate::core::auth::SigningCredentials;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate limiter behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// How long a caller may wait in a group's queue
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
    /// Tick of the per-group drain loop
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Response header carrying `<rate>:<burst>`
    #[serde(default = "default_adaptive_header")]
    pub adaptive_header: String,
    /// Environment variable holding JSON rate limit overrides
    #[serde(default = "default_overrides_env_key")]
    pub overrides_env_key: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            queue_timeout_secs: default_queue_timeout_secs(),
            drain_interval_ms: default_drain_interval_ms(),
            adaptive_header: default_adaptive_header(),
            overrides_env_key: default_overrides_env_key(),
        }
    }
}

impl LimiterConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Retry behaviour for throttled calls and queue timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add up to 10% random jitter to each delay
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Bearer token handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Seconds shaved off the reported lifetime of each access token
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: u64,
    /// Header the access token is sent in; `authorization` gets a `Bearer` prefix
    #[serde(default = "default_token_header")]
    pub header: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            buffer_secs: default_buffer_secs(),
            header: default_token_header(),
        }
    }
}

impl TokenConfig {
    pub fn buffer(&self) -> Duration {
        Duration::from_secs(self.buffer_secs)
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Optional request signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub credentials: SigningCredentials,
    /// Service name in the credential scope
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_queue_timeout_secs() -> u64 {
    60
}

fn default_drain_interval_ms() -> u64 {
    1_000
}

fn default_adaptive_header() -> String {
    "x-ratelimit-limit".to_string()
}

fn default_overrides_env_key() -> String {
    "RATE_DISPATCH_RATE_LIMITS".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_buffer_secs() -> u64 {
    300
}

fn default_token_header() -> String {
    "authorization".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("rate-dispatch/", env!("CARGO_PKG_VERSION")).to_string()
}

pub(crate) fn default_service() -> String {
    "execute-api".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limiter = LimiterConfig::default();
        assert_eq!(limiter.queue_timeout(), Duration::from_secs(60));
        assert_eq!(limiter.drain_interval(), Duration::from_secs(1));
        assert_eq!(limiter.adaptive_header, "x-ratelimit-limit");

        let token = TokenConfig::default();
        assert_eq!(token.buffer(), Duration::from_secs(300));
        assert_eq!(token.header, "authorization");

        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert!(retry.jitter);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let retry: RetryConfig = serde_yaml::from_str("max_attempts: 5").unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_delay(), Duration::from_millis(500));

        let limiter: LimiterConfig = serde_yaml::from_str("queue_timeout_secs: 10").unwrap();
        assert_eq!(limiter.queue_timeout(), Duration::from_secs(10));
        assert_eq!(limiter.drain_interval_ms, 1_000);
    }

    #[test]
    fn test_signing_section_flattens_credentials() {
        let yaml = r#"
access_key_id: AKIATEST
secret_key: secret
region: us-east-1
"#;
        let signing: SigningConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(signing.enabled);
        assert_eq!(signing.service, "execute-api");
        assert_eq!(signing.credentials.region, "us-east-1");
        assert!(signing.credentials.session_token.is_none());
    }
}
