//! Token exchange over real HTTP

use crate::common::{MockApi, TOKEN_PATH};
use futures::future::join_all;
use rate_dispatch::{BearerTokenCache, Credentials, ErrorKind, HttpConfig, ReqwestTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

fn cache(api: &MockApi) -> BearerTokenCache {
    let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
    BearerTokenCache::new(Arc::new(transport), api.token_url())
}

fn credentials() -> Credentials {
    Credentials::new("test-client", "test-secret", "test-refresh")
}

#[tokio::test]
async fn test_exchange_posts_form_and_caches() {
    let api = MockApi::start_without_token().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=test-refresh"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("client_secret=test-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "Atza|cached",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&api.server)
        .await;

    let cache = cache(&api);
    for _ in 0..3 {
        assert_eq!(cache.get_access_token(&credentials()).await.unwrap(), "Atza|cached");
    }
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_exchange() {
    let api = MockApi::start_without_token().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({"access_token": "Atza|shared", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&api.server)
        .await;

    let cache = cache(&api);
    let credentials = credentials();
    let tokens = join_all((0..8).map(|_| cache.get_access_token(&credentials))).await;

    for token in tokens {
        assert_eq!(token.unwrap(), "Atza|shared");
    }
}

#[tokio::test]
async fn test_token_shorter_than_buffer_is_refreshed_each_time() {
    let api = MockApi::start_without_token().await;
    api.mount_token("Atza|short", 60).await;

    let cache = cache(&api);
    cache.get_access_token(&credentials()).await.unwrap();
    cache.get_access_token(&credentials()).await.unwrap();

    assert_eq!(api.token_requests().await, 2);
}

#[tokio::test]
async fn test_clear_cache_forces_new_exchange() {
    let api = MockApi::start().await;
    let cache = cache(&api);

    cache.get_access_token(&credentials()).await.unwrap();
    cache.clear_cache(Some(&credentials()));
    assert!(cache.is_empty());
    cache.get_access_token(&credentials()).await.unwrap();

    assert_eq!(api.token_requests().await, 2);
}

#[tokio::test]
async fn test_malformed_token_response() {
    let api = MockApi::start_without_token().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&api.server)
        .await;

    let error = cache(&api)
        .get_access_token(&credentials())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthExchangeError);
    assert_eq!(error.http_status(), Some(200));
}
