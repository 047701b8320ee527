//! Sales API Library
//!
//! Sales management backend: customers, catalog, inventory, procurement,
//! sales and returns, promotions, reporting, plus desktop client update
//! distribution and per-client rate limiting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod services;
pub mod tracing;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use rate_limiter::{RateLimitLayer, RateLimiter};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wires every service and the rate limiter onto one shared connection.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        let rate_limiter = RateLimiter::from_settings(&config.rate_limit, db.clone())
            .with_events(event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            services,
            rate_limiter,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn paginated_response_serializes_per_page() {
        let page = PaginatedResponse {
            items: vec![1, 2],
            total: 12,
            page: 2,
            per_page: 5,
            total_pages: 3,
        };
        let value = serde_json::to_value(&page).expect("serialize");
        assert_eq!(value["per_page"], 5);
        assert_eq!(value["total_pages"], 3);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` resource router.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .merge(handlers::customers::routes())
        .merge(handlers::catalog::routes())
        .merge(handlers::inventory::routes())
        .merge(handlers::procurement::routes())
        .merge(handlers::sales::routes())
        .merge(handlers::promotions::routes())
        .merge(handlers::reports::routes())
        .merge(handlers::updates::routes())
        .merge(handlers::rate_limits::routes())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Service identity and version", body = ApiResponse<ApiStatus>)),
    tag = "health"
)]
pub async fn api_status() -> ApiResult<ApiStatus> {
    Ok(Json(ApiResponse::success(ApiStatus {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}

/// Full application router: versioned API, health probes, Swagger UI,
/// throttling, tracing and request ids. CORS is left to the binary.
///
/// Layers run outermost first: request id, tracing, then throttling, so
/// rejected requests still carry their request id.
pub fn app_router(state: AppState) -> Router {
    let mut app = Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .nest("/health", handlers::health::health_routes())
        .merge(openapi::swagger_ui())
        .with_state(state.clone());

    if state.config.rate_limit.enabled {
        let layer = RateLimitLayer::from_settings(state.rate_limiter, &state.config.rate_limit);
        app = app.layer(layer);
    }
    app.layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}
