use crate::{
    errors::{ErrorResponse, ServiceError},
    rate_limiter::BlockedClient,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetOutcome {
    pub client_id: String,
    pub trackers_removed: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rate-limits/blocked", get(list_blocked))
        .route("/rate-limits/:client_id/reset", post(reset_client))
}

#[utoipa::path(
    get,
    path = "/api/v1/rate-limits/blocked",
    responses((status = 200, description = "Clients serving a block", body = ApiResponse<Vec<BlockedClient>>)),
    tag = "rate-limits"
)]
pub async fn list_blocked(State(state): State<AppState>) -> ApiResult<Vec<BlockedClient>> {
    let blocked = state
        .rate_limiter
        .list_blocked(Utc::now())
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(ApiResponse::success(blocked)))
}

#[utoipa::path(
    post,
    path = "/api/v1/rate-limits/{client_id}/reset",
    params(("client_id" = String, Path, description = "Client key as seen by the limiter")),
    responses(
        (status = 200, description = "Counters and blocks cleared", body = ApiResponse<ResetOutcome>),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "rate-limits"
)]
pub async fn reset_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> ApiResult<ResetOutcome> {
    let trackers_removed = state
        .rate_limiter
        .reset_client(&client_id)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(ApiResponse::success(ResetOutcome {
        client_id,
        trackers_removed,
    })))
}
