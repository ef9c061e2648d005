//! Test fixtures
//!
//! [`MockApi`] is a wiremock server playing both the OAuth token endpoint and
//! the remote API.

use rate_dispatch::{
    Credentials, Dispatcher, DispatcherConfig, RateLimitRegistry, RetryConfig,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the token endpoint on the mock server
pub const TOKEN_PATH: &str = "/auth/o2/token";

pub struct MockApi {
    pub server: MockServer,
}

impl MockApi {
    /// Start a server whose token endpoint hands out `test-access-token`
    pub async fn start() -> Self {
        let api = Self::start_without_token().await;
        api.mount_token("test-access-token", 3600).await;
        api
    }

    pub async fn start_without_token() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub async fn mount_token(&self, access_token: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "bearer",
                "expires_in": expires_in,
            })))
            .mount(&self.server)
            .await;
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.server.uri(), TOKEN_PATH)
    }

    /// Configuration pointing at this server with fast retries
    pub fn config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::new(
            self.uri(),
            self.token_url(),
            Credentials::new("test-client", "test-secret", "test-refresh"),
        );
        config.retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter: false,
        };
        config.limiter.drain_interval_ms = 20;
        config
    }

    /// Dispatcher on the built-in tables, ignoring environment overrides
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with(self.config())
    }

    pub fn dispatcher_with(&self, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::builder(config)
            .with_registry(RateLimitRegistry::new())
            .build()
            .unwrap()
    }

    /// Requests the server received, excluding token exchanges
    pub async fn api_requests(&self) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() != TOKEN_PATH)
            .collect()
    }

    pub async fn token_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == TOKEN_PATH)
            .count()
    }
}
