//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.

use super::DispatcherConfig;
use super::models::*;
use crate::core::auth::{Credentials, SigningCredentials};
use crate::utils::error::{DispatchError, Result};
use tracing::debug;
use url::Url;

/// Check that a URL is absolute http(s) with a host
fn validate_http_url(url_str: &str, context: &str) -> Result<()> {
    let url = Url::parse(url_str).map_err(|e| {
        DispatchError::invalid_config(format!("{} has invalid URL format: {}", context, e))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(DispatchError::invalid_config(format!(
                "{} must use http:// or https:// scheme, got: {}",
                context, scheme
            )));
        }
    }

    if url.host_str().is_none() {
        return Err(DispatchError::invalid_config(format!(
            "{} URL must have a valid host",
            context
        )));
    }

    Ok(())
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DispatchError::invalid_config(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for DispatcherConfig {
    fn validate(&self) -> Result<()> {
        debug!("Validating dispatcher configuration");

        validate_http_url(&self.base_url, "Base URL")?;
        validate_http_url(&self.token_url, "Token URL")?;
        self.credentials.validate()?;
        self.limiter.validate()?;
        self.retry.validate()?;
        self.token.validate()?;
        self.http.validate()?;

        if let Some(signing) = &self.signing {
            signing.validate()?;
            if signing.enabled && self.token.header.eq_ignore_ascii_case("authorization") {
                return Err(DispatchError::invalid_config(
                    "Request signing writes the authorization header; \
                     send the access token in another header (token.header)",
                ));
            }
        }

        Ok(())
    }
}

impl Validate for Credentials {
    fn validate(&self) -> Result<()> {
        require(&self.client_id, "Client id")?;
        require(&self.client_secret, "Client secret")?;
        require(&self.refresh_token, "Refresh token")?;
        Ok(())
    }
}

impl Validate for SigningCredentials {
    fn validate(&self) -> Result<()> {
        require(&self.access_key_id, "Signing access key id")?;
        require(&self.secret_key, "Signing secret key")?;
        require(&self.region, "Signing region")?;
        Ok(())
    }
}

impl Validate for SigningConfig {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.credentials.validate()?;
        require(&self.service, "Signing service")?;
        Ok(())
    }
}

impl Validate for LimiterConfig {
    fn validate(&self) -> Result<()> {
        if self.queue_timeout_secs == 0 {
            return Err(DispatchError::invalid_config(
                "Limiter queue timeout must be greater than 0",
            ));
        }

        if self.drain_interval_ms == 0 {
            return Err(DispatchError::invalid_config(
                "Limiter drain interval must be greater than 0",
            ));
        }

        require(&self.adaptive_header, "Limiter adaptive header")?;
        Ok(())
    }
}

impl Validate for RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(DispatchError::invalid_config(
                "Retry max attempts must be greater than 0",
            ));
        }

        if self.max_attempts > 10 {
            return Err(DispatchError::invalid_config(
                "Retry max attempts should not exceed 10",
            ));
        }

        if self.base_delay_ms == 0 {
            return Err(DispatchError::invalid_config(
                "Retry base delay must be greater than 0",
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(DispatchError::invalid_config(
                "Retry max delay must not be less than base delay",
            ));
        }

        Ok(())
    }
}

impl Validate for TokenConfig {
    fn validate(&self) -> Result<()> {
        require(&self.header, "Token header")
    }
}

impl Validate for HttpConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(DispatchError::invalid_config(
                "HTTP timeout must be greater than 0",
            ));
        }

        if self.timeout_secs > 300 {
            return Err(DispatchError::invalid_config(
                "HTTP timeout should not exceed 5 minutes",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_must_be_complete() {
        assert!(Credentials::new("id", "secret", "refresh").validate().is_ok());
        assert!(Credentials::new("", "secret", "refresh").validate().is_err());
        assert!(Credentials::new("id", " ", "refresh").validate().is_err());
        assert!(Credentials::new("id", "secret", "").validate().is_err());
    }

    #[test]
    fn test_disabled_signing_skips_credentials() {
        let signing = SigningConfig {
            enabled: false,
            credentials: SigningCredentials::new("", "", ""),
            service: default_service(),
        };
        assert!(signing.validate().is_ok());

        let signing = SigningConfig {
            enabled: true,
            ..signing
        };
        assert!(signing.validate().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let mut retry = RetryConfig::default();
        assert!(retry.validate().is_ok());

        retry.max_attempts = 0;
        assert!(retry.validate().is_err());

        retry.max_attempts = 3;
        retry.max_delay_ms = 100;
        assert!(retry.validate().is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_http_url("https://api.example.com", "Base URL").is_ok());
        assert!(validate_http_url("ftp://api.example.com", "Base URL").is_err());
        assert!(validate_http_url("api.example.com", "Base URL").is_err());
    }

    #[test]
    fn test_limiter_and_http_bounds() {
        let limiter = LimiterConfig {
            queue_timeout_secs: 0,
            ..LimiterConfig::default()
        };
        assert!(limiter.validate().is_err());

        let http = HttpConfig {
            timeout_secs: 0,
            ..HttpConfig::default()
        };
        assert!(http.validate().is_err());
    }
}
