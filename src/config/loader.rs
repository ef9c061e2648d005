//! Configuration loading from environment variables

use super::DispatcherConfig;
use super::models::*;
use super::validation::Validate;
use crate::core::auth::{Credentials, SigningCredentials};
use crate::utils::error::{DispatchError, Result};
use std::str::FromStr;
use tracing::{debug, info};

/// Prefix shared by every environment variable read here
pub const ENV_PREFIX: &str = "RATE_DISPATCH_";

impl DispatcherConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which receives full variable names
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty())
        };
        let required = |name: &str| {
            var(name).ok_or_else(|| {
                DispatchError::invalid_config(format!(
                    "Missing environment variable {}{}",
                    ENV_PREFIX, name
                ))
            })
        };

        let credentials = Credentials::new(
            required("CLIENT_ID")?,
            required("CLIENT_SECRET")?,
            required("REFRESH_TOKEN")?,
        );
        let mut config =
            DispatcherConfig::new(required("BASE_URL")?, required("TOKEN_URL")?, credentials);

        if let Some(access_key_id) = var("AWS_ACCESS_KEY_ID") {
            let mut signing_credentials = SigningCredentials::new(
                access_key_id,
                required("AWS_SECRET_KEY")?,
                required("AWS_REGION")?,
            );
            if let Some(token) = var("AWS_SESSION_TOKEN") {
                signing_credentials = signing_credentials.with_session_token(token);
            }
            config.signing = Some(SigningConfig {
                enabled: parse_var(&var, "SIGNING_ENABLED")?.unwrap_or(true),
                credentials: signing_credentials,
                service: var("SIGNING_SERVICE").unwrap_or_else(default_service),
            });
        }

        if let Some(header) = var("TOKEN_HEADER") {
            config.token.header = header;
        }
        if let Some(secs) = parse_var(&var, "TOKEN_BUFFER_SECS")? {
            config.token.buffer_secs = secs;
        }
        if let Some(secs) = parse_var(&var, "QUEUE_TIMEOUT_SECS")? {
            config.limiter.queue_timeout_secs = secs;
        }
        if let Some(ms) = parse_var(&var, "DRAIN_INTERVAL_MS")? {
            config.limiter.drain_interval_ms = ms;
        }
        if let Some(attempts) = parse_var(&var, "MAX_RETRIES")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = parse_var(&var, "HTTP_TIMEOUT_SECS")? {
            config.http.timeout_secs = secs;
        }

        config.validate()?;
        debug!("Environment configuration loaded");
        Ok(config)
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                DispatchError::invalid_config(format!("Invalid {}{}: {}", ENV_PREFIX, name, e))
            })
        })
        .transpose()
}
