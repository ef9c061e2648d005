//! Configuration loading end to end

use crate::common::MockApi;
use rate_dispatch::{DispatchOptions, Dispatcher, DispatcherConfig, ErrorKind, Method};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_dispatcher_from_yaml_file() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/tokens"))
        .and(header("x-amz-access-token", "test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&api.server)
        .await;

    let yaml = format!(
        r#"
base_url: "{base}"
token_url: "{token}"
credentials:
  client_id: "test-client"
  client_secret: "test-secret"
  refresh_token: "test-refresh"
token:
  header: "x-amz-access-token"
  buffer_secs: 60
http:
  timeout_secs: 5
"#,
        base = api.uri(),
        token = api.token_url(),
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = DispatcherConfig::from_file(file.path()).await.unwrap();
    assert_eq!(config.token.buffer_secs, 60);

    let dispatcher = Dispatcher::from_config(config).unwrap();
    let response = dispatcher
        .dispatch(Method::GET, "/tokens", DispatchOptions::new())
        .await
        .unwrap();
    assert_eq!(response.data.as_json().unwrap()["ok"], true);
}

#[tokio::test]
async fn test_malformed_yaml_is_invalid_config() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"base_url: [unterminated").unwrap();

    let error = DispatcherConfig::from_file(file.path()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_environment_configuration() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("RATE_DISPATCH_BASE_URL", "https://sellingpartnerapi-na.amazon.com"),
        ("RATE_DISPATCH_TOKEN_URL", "https://api.amazon.com/auth/o2/token"),
        ("RATE_DISPATCH_CLIENT_ID", "client"),
        ("RATE_DISPATCH_CLIENT_SECRET", "secret"),
        ("RATE_DISPATCH_REFRESH_TOKEN", "refresh"),
        ("RATE_DISPATCH_DRAIN_INTERVAL_MS", "250"),
        ("RATE_DISPATCH_HTTP_TIMEOUT_SECS", "10"),
    ]);

    let config =
        DispatcherConfig::from_env_with(|key| vars.get(key).map(|v| v.to_string())).unwrap();

    assert_eq!(config.limiter.drain_interval_ms, 250);
    assert_eq!(config.http.timeout_secs, 10);
    assert!(Dispatcher::from_config(config).is_ok());
}

#[test]
fn test_environment_signing_requires_secret() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("RATE_DISPATCH_BASE_URL", "https://sellingpartnerapi-na.amazon.com"),
        ("RATE_DISPATCH_TOKEN_URL", "https://api.amazon.com/auth/o2/token"),
        ("RATE_DISPATCH_CLIENT_ID", "client"),
        ("RATE_DISPATCH_CLIENT_SECRET", "secret"),
        ("RATE_DISPATCH_REFRESH_TOKEN", "refresh"),
        ("RATE_DISPATCH_AWS_ACCESS_KEY_ID", "AKIATEST"),
    ]);

    let error = DispatcherConfig::from_env_with(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap_err();
    assert!(error.to_string().contains("RATE_DISPATCH_AWS_SECRET_KEY"));
}
