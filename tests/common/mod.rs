#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sales_api::{
    config::AppConfig,
    db,
    events::{self, EventSender},
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application harness backed by an in-memory SQLite database and a
/// throwaway artifact directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _storage: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh application with throttling switched off.
    pub async fn new() -> Self {
        Self::with_config(|cfg| cfg.rate_limit.enabled = false).await
    }

    /// Fresh application after `configure` has adjusted the defaults.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let storage = TempDir::new().expect("create artifact dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_idle_timeout_secs = 3_600;
        cfg.updates.storage_dir = storage.path().to_path_buf();
        cfg.updates.max_upload_bytes = 1024 * 1024;
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = sales_api::app_router(state.clone());

        Self {
            router,
            state,
            _storage: storage,
            _event_task: event_task,
        }
    }

    /// Send a JSON request through the full router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(body)).await
    }

    /// POST that must succeed; returns the `data` payload.
    pub async fn post_ok(&self, uri: &str, body: Value) -> Value {
        let response = self.post(uri, body).await;
        let status = response.status();
        let json = response_json(response).await;
        assert!(status.is_success(), "POST {} failed with {}: {}", uri, status, json);
        json["data"].clone()
    }

    /// GET that must succeed; returns the `data` payload.
    pub async fn get_ok(&self, uri: &str) -> Value {
        let response = self.get(uri).await;
        let status = response.status();
        let json = response_json(response).await;
        assert_eq!(status, StatusCode::OK, "GET {} failed: {}", uri, json);
        json["data"].clone()
    }

    pub async fn create_customer(&self, name: &str, email: &str) -> Value {
        self.post_ok(
            "/api/v1/customers",
            json!({ "name": name, "email": email, "customer_type": "regular" }),
        )
        .await
    }

    pub async fn create_category(&self, name: &str) -> Value {
        self.post_ok("/api/v1/categories", json!({ "name": name })).await
    }

    /// Product with an inventory row holding `stock` units; returns the product.
    pub async fn create_product(&self, sku: &str, price: &str, stock: i32) -> Value {
        self.create_product_in(sku, price, stock, None).await
    }

    pub async fn create_product_in(
        &self,
        sku: &str,
        price: &str,
        stock: i32,
        category_id: Option<&str>,
    ) -> Value {
        let detail = self
            .post_ok(
                "/api/v1/products",
                json!({
                    "name": format!("Product {}", sku),
                    "sku": sku,
                    "price": price,
                    "cost_price": "1.00",
                    "category_id": category_id,
                    "initial_stock": stock,
                    "min_stock_level": 2
                }),
            )
            .await;
        detail["product"].clone()
    }

    pub async fn stock_of(&self, product_id: &str) -> i64 {
        let record = self
            .get_ok(&format!("/api/v1/inventory/{}", product_id))
            .await;
        record["quantity"].as_i64().expect("quantity")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Decimals serialize as strings; accept numbers too.
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {}", other),
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}

pub fn random_sku(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}
