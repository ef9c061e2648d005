//! Configuration management for the dispatcher
//!
//! This module handles loading and validation of the dispatcher configuration.

mod loader;
pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::core::auth::Credentials;
use crate::utils::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Root of the remote API; endpoint paths are appended to it
    pub base_url: String,
    /// OAuth token endpoint used for refresh-token exchange
    pub token_url: String,
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl DispatcherConfig {
    /// Configuration with every section at its default
    pub fn new(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token_url: token_url.into(),
            credentials,
            signing: None,
            limiter: LimiterConfig::default(),
            retry: RetryConfig::default(),
            token: TokenConfig::default(),
            http: HttpConfig::default(),
        }
    }

    /// Load configuration from file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            DispatchError::invalid_config(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| DispatchError::invalid_config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Signing settings, when present and enabled
    pub fn active_signing(&self) -> Option<&SigningConfig> {
        self.signing.as_ref().filter(|signing| signing.enabled)
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            DispatchError::invalid_config(format!("Failed to serialize config to YAML: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
base_url: "https://sellingpartnerapi-eu.amazon.com"
token_url: "https://api.amazon.com/auth/o2/token"
credentials:
  client_id: "amzn1.application-oa2-client.abc"
  client_secret: "secret"
  refresh_token: "Atzr|refresh"
signing:
  access_key_id: "AKIATEST"
  secret_key: "aws-secret"
  region: "eu-west-1"
token:
  header: "x-amz-access-token"
limiter:
  queue_timeout_secs: 30
retry:
  max_attempts: 5
"#;

    #[tokio::test]
    async fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(CONFIG.as_bytes()).unwrap();

        let config = DispatcherConfig::from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.base_url, "https://sellingpartnerapi-eu.amazon.com");
        assert_eq!(config.credentials.client_id, "amzn1.application-oa2-client.abc");
        assert_eq!(config.limiter.queue_timeout_secs, 30);
        assert_eq!(config.limiter.drain_interval_ms, 1_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.active_signing().unwrap().credentials.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_config() {
        let error = DispatcherConfig::from_file("/nonexistent/rate-dispatch.yaml")
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::InvalidConfig { .. }));
    }

    #[test]
    fn test_signing_requires_separate_token_header() {
        let config = CONFIG.replace(
            "  header: \"x-amz-access-token\"",
            "  header: \"authorization\"",
        );
        let error = DispatcherConfig::from_yaml_str(&config).unwrap_err();
        assert!(error.to_string().contains("token.header"));
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let config = DispatcherConfig::from_yaml_str(CONFIG).unwrap();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(DispatcherConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let config = CONFIG.replace("max_attempts: 5", "max_attempts: 0");
        assert!(DispatcherConfig::from_yaml_str(&config).is_err());

        let config = CONFIG.replace("https://sellingpartnerapi-eu.amazon.com", "not a url");
        assert!(DispatcherConfig::from_yaml_str(&config).is_err());
    }
}
