//! Dispatcher tests against a mock API

use crate::common::MockApi;
use rate_dispatch::{DispatchOptions, ErrorKind, Method, ResponseData, ResponseKind};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_get_with_query_and_adaptive_header() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("MarketplaceIds", "A1PA6795UKMFR9"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "0.5:40")
                .set_body_json(json!({"payload": {"Orders": []}})),
        )
        .expect(1)
        .mount(&api.server)
        .await;

    let dispatcher = api.dispatcher();
    let response = dispatcher
        .dispatch(
            Method::GET,
            "/orders",
            DispatchOptions::new().query("MarketplaceIds", "A1PA6795UKMFR9"),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(
        response.data,
        ResponseData::Json(json!({"payload": {"Orders": []}}))
    );

    let adapted = dispatcher.limiter().group_config("order_list").await.unwrap();
    assert_eq!(adapted.rate, 0.5);
    assert_eq!(adapted.burst, 40);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let api = MockApi::start().await;
    Mock::given(method("POST"))
        .and(path("/feeds"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"feedType": "POST_PRODUCT_DATA"})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"feedId": "F1"})))
        .mount(&api.server)
        .await;

    let dispatcher = api.dispatcher();
    let response = dispatcher
        .dispatch(
            Method::POST,
            "/feeds",
            DispatchOptions::new().body(json!({"feedType": "POST_PRODUCT_DATA"})),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 202);
    assert_eq!(response.data.as_json().unwrap()["feedId"], "F1");
}

#[tokio::test]
async fn test_text_response_kind() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/reports/R1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("sku\tqty\nA\t1\n"))
        .mount(&api.server)
        .await;

    let dispatcher = api.dispatcher();
    let response = dispatcher
        .dispatch(
            Method::GET,
            "/reports/R1",
            DispatchOptions::new().response_kind(ResponseKind::Text),
        )
        .await
        .unwrap();

    assert_eq!(response.data.as_text(), Some("sku\tqty\nA\t1\n"));
}

#[tokio::test]
async fn test_not_found_is_classified() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&api.server)
        .await;

    let error = api
        .dispatcher()
        .dispatch(Method::GET, "/orders/missing", DispatchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.group(), Some("order_detail"));
    assert_eq!(error.http_status(), Some(404));
}

#[tokio::test]
async fn test_throttled_then_success_is_retried() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/invoices/INV-1"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/invoices/INV-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "INV-1"})))
        .mount(&api.server)
        .await;

    let response = api
        .dispatcher()
        .dispatch(Method::GET, "/invoices/INV-1", DispatchOptions::new())
        .await
        .unwrap();

    assert_eq!(response.data.as_json().unwrap()["id"], "INV-1");
    assert_eq!(api.api_requests().await.len(), 2);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/listings/SKU-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"code": "Unauthorized", "message": "Access to requested resource is denied."}]
        })))
        .expect(1)
        .mount(&api.server)
        .await;

    let error = api
        .dispatcher()
        .dispatch(Method::GET, "/listings/SKU-1", DispatchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthFailed);
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_invalid_credentials_send_nothing() {
    let api = MockApi::start().await;
    let mut config = api.config();
    config.credentials.refresh_token = String::new();

    let error = api
        .dispatcher_with(config)
        .dispatch(Method::GET, "/orders", DispatchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidConfig);
    assert!(api.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_token_exchange() {
    let api = MockApi::start_without_token().await;
    Mock::given(method("POST"))
        .and(path(crate::common::TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The request has an invalid grant parameter"
        })))
        .mount(&api.server)
        .await;

    let error = api
        .dispatcher()
        .dispatch(Method::GET, "/orders", DispatchOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthExchangeError);
    assert_eq!(error.group(), Some("order_list"));
    assert!(error.to_string().contains("invalid_grant"));
    assert!(api.api_requests().await.is_empty());
}

#[tokio::test]
async fn test_connection_refused() {
    let api = MockApi::start().await;
    let mut config = api.config();
    // Nothing listens on port 1
    config.base_url = "http://127.0.0.1:1".to_string();

    let error = api
        .dispatcher_with(config)
        .dispatch(Method::GET, "/orders", DispatchOptions::new())
        .await
        .unwrap_err();

    assert!(
        matches!(
            error.kind(),
            ErrorKind::ConnectionFailed | ErrorKind::UnknownNetworkError
        ),
        "unexpected kind {:?}",
        error.kind()
    );
}
