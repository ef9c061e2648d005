//! Bearer token cache
//!
//! Exchanges a refresh credential for a short-lived access token and keeps it
//! per client id until shortly before it expires.

use super::types::{CachedToken, Credentials};
use crate::core::events::{DispatchEvent, EventSink, TracingEventSink};
use crate::core::http::{HttpRequest, HttpTransport, Method};
use crate::utils::error::{DispatchError, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default safety margin subtracted from each token's lifetime
pub const DEFAULT_TOKEN_BUFFER: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

type TokenSlot = Arc<Mutex<Option<CachedToken>>>;

/// Per-credential access token cache
///
/// Each credential owns one slot guarded by its own async mutex: a caller that
/// finds the slot empty or stale performs the exchange while holding it, and
/// callers arriving meanwhile wait for that exchange instead of starting their
/// own. Slots of different credentials never contend.
pub struct BearerTokenCache {
    transport: Arc<dyn HttpTransport>,
    token_url: String,
    buffer: Duration,
    slots: DashMap<String, TokenSlot>,
    events: Arc<dyn EventSink>,
}

impl BearerTokenCache {
    pub fn new(transport: Arc<dyn HttpTransport>, token_url: impl Into<String>) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            buffer: DEFAULT_TOKEN_BUFFER,
            slots: DashMap::new(),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Get a valid access token, exchanging the refresh token when needed
    pub async fn get_access_token(&self, credentials: &Credentials) -> Result<String> {
        let slot = self.slot(credentials.cache_key());
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Instant::now()) {
                return Ok(token.access_token.clone());
            }
            debug!(client_id = %credentials.client_id, "cached access token expired");
        }

        let token = self.exchange(credentials).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    /// Evict one credential's token, or every token when `credentials` is `None`
    pub fn clear_cache(&self, credentials: Option<&Credentials>) {
        match credentials {
            Some(credentials) => {
                self.slots.remove(credentials.cache_key());
            }
            None => self.slots.clear(),
        }
    }

    /// Number of credentials with a cache slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &str) -> TokenSlot {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.slots.entry(key.to_string()).or_default())
    }

    async fn exchange(&self, credentials: &Credentials) -> Result<CachedToken> {
        let client_id = credentials.client_id.as_str();
        let token_url = self.token_url.as_str();
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &credentials.refresh_token)
            .append_pair("client_id", client_id)
            .append_pair("client_secret", &credentials.client_secret)
            .finish();

        let request = HttpRequest::new(Method::POST, token_url)
            .header(
                "content-type",
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .header("accept", "application/json")
            .body(form);

        let response = self.transport.execute(request).await.map_err(|e| {
            DispatchError::auth_exchange(
                client_id,
                token_url,
                None,
                format!("token endpoint unreachable: {}", e),
            )
        })?;

        if !response.is_success() {
            let body = response.text();
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            warn!(client_id, status = response.status, "token exchange rejected");
            return Err(DispatchError::auth_exchange(
                client_id,
                token_url,
                Some(response.status),
                message,
            ));
        }

        let parsed: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            DispatchError::auth_exchange(
                client_id,
                token_url,
                Some(response.status),
                format!("malformed token response: {}", e),
            )
        })?;

        let expires_in = Duration::from_secs(parsed.expires_in);
        if expires_in <= self.buffer {
            warn!(
                client_id,
                expires_in_secs = parsed.expires_in,
                buffer_secs = self.buffer.as_secs(),
                "access token lifetime is shorter than the safety buffer"
            );
        }

        let expires_at = Instant::now()
            .checked_add(expires_in.saturating_sub(self.buffer))
            .ok_or_else(|| {
                DispatchError::auth_exchange(
                    client_id,
                    token_url,
                    Some(response.status),
                    format!("expires_in out of range: {}", parsed.expires_in),
                )
            })?;
        info!(client_id, expires_in_secs = parsed.expires_in, "exchanged refresh token");
        self.events.record(DispatchEvent::TokenRefreshed {
            client_id: client_id.to_string(),
            expires_in,
        });

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
