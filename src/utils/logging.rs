//! Logging setup
//!
//! Filter precedence: `RATE_DISPATCH_LOG`, then `RUST_LOG`, then the level
//! passed in.

use crate::utils::error::{DispatchError, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable checked first for a filter directive
pub const LOG_ENV: &str = "RATE_DISPATCH_LOG";

/// Filter built from the environment, falling back to `default_level`
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directive).map_err(|e| {
        DispatchError::invalid_config(format!("Invalid log filter '{}': {}", directive, e))
    })
}

/// Install the global subscriber
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_logging(default_level: &str, json: bool) -> Result<()> {
    let filter = env_filter(default_level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    let installed = if json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| {
        DispatchError::invalid_config(format!("Failed to initialize logging: {}", e))
    })
}
