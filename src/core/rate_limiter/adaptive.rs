//! Server-driven limit updates

use super::limiter::TokenBucketLimiter;
use super::types::RateLimitConfig;
use crate::core::events::DispatchEvent;
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl TokenBucketLimiter {
    /// Apply a `<rate>:<burst>` descriptor from response headers to `group`
    ///
    /// Tokens accrued under the old rate are kept, then clamped to the new
    /// capacity. Returns whether the group's configuration changed; missing or
    /// malformed headers leave the bucket untouched.
    pub async fn adapt_from_headers(&self, group: &str, headers: &HashMap<String, String>) -> bool {
        let header = self.inner.settings.adaptive_header.as_str();
        let Some(value) = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header))
            .map(|(_, value)| value.as_str())
        else {
            return false;
        };

        let Some(config) = RateLimitConfig::parse_descriptor(value) else {
            warn!(group, header, value, "Ignoring malformed rate limit header");
            return false;
        };

        if self.inner.is_shut_down() {
            return false;
        }

        let handle = self.inner.group(group);
        let mut state = handle.lock().await;
        state.adapted = true;
        if state.config == config {
            return false;
        }

        let previous = state.config;
        if let Err(e) = self.inner.backend.refill_tokens(group, &previous).await {
            warn!(group, "refill before adapting failed: {}", e);
        }
        state.config = config;
        if let Err(e) = self.inner.backend.refill_tokens(group, &config).await {
            warn!(group, "refill after adapting failed: {}", e);
        }

        info!(
            group,
            old_rate = previous.rate,
            old_burst = previous.burst,
            rate = config.rate,
            burst = config.burst,
            "Adapted rate limit from response header"
        );
        self.inner.events.record(DispatchEvent::RateLimitAdapted {
            group: group.to_string(),
            config,
        });
        debug!(group, queued = state.queue.len(), "adaptive update applied");
        true
    }
}
