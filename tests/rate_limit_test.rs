mod common;

use axum::http::{Method, StatusCode};
use rstest::rstest;
use serde_json::Value;

use common::{response_json, TestApp};

async fn throttled_app(backend: &str, limit: u32) -> TestApp {
    let backend = backend.to_string();
    TestApp::with_config(move |cfg| {
        cfg.rate_limit.enabled = true;
        cfg.rate_limit.backend = backend;
        cfg.rate_limit.requests_per_window = limit;
        cfg.rate_limit.window_secs = 60;
        cfg.rate_limit.base_block_secs = 30;
        cfg.rate_limit.max_block_secs = 600;
    })
    .await
}

async fn get_as(app: &TestApp, client: &str, uri: &str) -> axum::response::Response {
    app.request_with_headers(Method::GET, uri, None, &[("x-client-id", client)])
        .await
}

async fn post_as(app: &TestApp, client: &str, uri: &str) -> Value {
    let response = app
        .request_with_headers(Method::POST, uri, None, &[("x-client-id", client)])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"].clone()
}

#[rstest]
#[case("in-memory")]
#[case("database")]
#[tokio::test]
async fn client_is_blocked_listed_and_reset(#[case] backend: &str) {
    let app = throttled_app(backend, 3).await;

    for expected_remaining in ["2", "1", "0"] {
        let response = get_as(&app, "pos-7", "/api/v1/customers").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
        assert!(response.headers().contains_key("x-ratelimit-reset"));
    }

    let response = get_as(&app, "pos-7", "/api/v1/customers").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "30");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let body = response_json(response).await;
    assert_eq!(body["error"], "Too Many Requests");
    assert_eq!(body["details"]["retry_after_secs"], 30);

    // Other clients keep their own budget.
    let response = get_as(&app, "pos-8", "/api/v1/customers").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_as(&app, "admin", "/api/v1/rate-limits/blocked").await;
    assert_eq!(response.status(), StatusCode::OK);
    let blocked = response_json(response).await["data"].clone();
    let blocked = blocked.as_array().expect("blocked clients");
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0]["client_id"], "pos-7");
    assert_eq!(blocked[0]["endpoint"], "/api/v1/customers");
    assert_eq!(blocked[0]["violation_count"], 1);

    let outcome = post_as(&app, "admin", "/api/v1/rate-limits/pos-7/reset").await;
    assert_eq!(outcome["client_id"], "pos-7");
    assert_eq!(outcome["trackers_removed"], 1);

    let response = get_as(&app, "pos-7", "/api/v1/customers").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn throttled_responses_keep_the_request_id() {
    let app = throttled_app("in-memory", 1).await;
    let headers = [("x-client-id", "pos-3"), ("x-request-id", "rid-2")];

    let response = app
        .request_with_headers(Method::GET, "/api/v1/products", None, &headers)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_with_headers(Method::GET, "/api/v1/products", None, &headers)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-request-id"], "rid-2");
    let body = response_json(response).await;
    assert_eq!(body["request_id"], "rid-2");
}

#[tokio::test]
async fn record_ids_share_one_counter() {
    let app = throttled_app("in-memory", 2).await;

    for _ in 0..2 {
        let response = get_as(
            &app,
            "pos-1",
            &format!("/api/v1/customers/{}", uuid::Uuid::new_v4()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = get_as(
        &app,
        "pos-1",
        &format!("/api/v1/customers/{}", uuid::Uuid::new_v4()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different endpoint is counted separately.
    let response = get_as(&app, "pos-1", "/api/v1/products").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn exempt_paths_are_never_throttled() {
    let app = throttled_app("in-memory", 1).await;

    for _ in 0..5 {
        let response = get_as(&app, "probe", "/health/live").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));

        let response = get_as(&app, "probe", "/api/v1/status").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn path_policy_overrides_the_default_limit() {
    let app = TestApp::with_config(|cfg| {
        cfg.rate_limit.enabled = true;
        cfg.rate_limit.requests_per_window = 100;
        cfg.rate_limit.path_policies = Some("/api/v1/reports:1:60".to_string());
    })
    .await;

    let response = get_as(&app, "analyst", "/api/v1/reports/sales-summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "1");

    // Every report shares the prefix budget.
    let response = get_as(&app, "analyst", "/api/v1/reports/top-products").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = get_as(&app, "analyst", "/api/v1/customers").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
}

#[tokio::test]
async fn repeat_offenders_get_longer_blocks() {
    let app = throttled_app("in-memory", 1).await;

    get_as(&app, "noisy", "/api/v1/products").await;
    let response = get_as(&app, "noisy", "/api/v1/products").await;
    assert_eq!(response.headers()["retry-after"], "30");

    // The first block runs out after 30 seconds; the violation is remembered.
    let state = &app.state.rate_limiter;
    let blocked = state
        .list_blocked(chrono::Utc::now() + chrono::Duration::seconds(31))
        .await
        .expect("list blocked");
    assert!(blocked.is_empty());

    let later = chrono::Utc::now() + chrono::Duration::seconds(120);
    let policy = state.config().policy(None);
    let decision = state.check("noisy", "/api/v1/products", &policy, later).await;
    assert!(decision.is_allowed());
    let decision = state.check("noisy", "/api/v1/products", &policy, later).await;
    assert_eq!(decision.retry_after_secs(), 60);
}
