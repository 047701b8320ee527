use super::common::created_response;
use crate::{
    errors::{ErrorResponse, ServiceError},
    models::promotion,
    services::promotions::{
        CreatePromotionInput, EvaluatePromotionInput, PromotionEvaluation, UpdatePromotionInput,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PromotionListQuery {
    /// Only promotions that are switched on and currently running
    #[serde(default)]
    pub active_only: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/promotions", get(list_promotions).post(create_promotion))
        .route("/promotions/evaluate", post(evaluate_promotion))
        .route(
            "/promotions/:id",
            get(get_promotion).put(update_promotion),
        )
        .route("/promotions/:id/deactivate", post(deactivate_promotion))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions",
    params(PromotionListQuery),
    responses((status = 200, description = "Promotions", body = ApiResponse<Vec<promotion::Model>>)),
    tag = "promotions"
)]
pub async fn list_promotions(
    State(state): State<AppState>,
    Query(query): Query<PromotionListQuery>,
) -> ApiResult<Vec<promotion::Model>> {
    let promotions = state
        .services
        .promotions
        .list_promotions(query.active_only)
        .await?;
    Ok(Json(ApiResponse::success(promotions)))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions",
    request_body = CreatePromotionInput,
    responses(
        (status = 201, description = "Promotion created", body = ApiResponse<promotion::Model>),
        (status = 400, description = "Invalid rule", body = ErrorResponse),
        (status = 409, description = "Code already used", body = ErrorResponse)
    ),
    tag = "promotions"
)]
pub async fn create_promotion(
    State(state): State<AppState>,
    Json(input): Json<CreatePromotionInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let promotion = state.services.promotions.create_promotion(input).await?;
    Ok(created_response(promotion))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion id")),
    responses(
        (status = 200, description = "Promotion", body = ApiResponse<promotion::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "promotions"
)]
pub async fn get_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<promotion::Model> {
    let promotion = state.services.promotions.get_promotion(id).await?;
    Ok(Json(ApiResponse::success(promotion)))
}

#[utoipa::path(
    put,
    path = "/api/v1/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion id")),
    request_body = UpdatePromotionInput,
    responses(
        (status = 200, description = "Promotion updated", body = ApiResponse<promotion::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "promotions"
)]
pub async fn update_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePromotionInput>,
) -> ApiResult<promotion::Model> {
    let promotion = state
        .services
        .promotions
        .update_promotion(id, input)
        .await?;
    Ok(Json(ApiResponse::success(promotion)))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Promotion id")),
    responses(
        (status = 200, description = "Promotion switched off", body = ApiResponse<promotion::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "promotions"
)]
pub async fn deactivate_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<promotion::Model> {
    let promotion = state.services.promotions.deactivate_promotion(id).await?;
    Ok(Json(ApiResponse::success(promotion)))
}

/// Prices a basket against a promotion code without recording anything.
#[utoipa::path(
    post,
    path = "/api/v1/promotions/evaluate",
    request_body = EvaluatePromotionInput,
    responses(
        (status = 200, description = "Eligibility and discount", body = ApiResponse<PromotionEvaluation>),
        (status = 404, description = "Unknown code or product", body = ErrorResponse)
    ),
    tag = "promotions"
)]
pub async fn evaluate_promotion(
    State(state): State<AppState>,
    Json(input): Json<EvaluatePromotionInput>,
) -> ApiResult<PromotionEvaluation> {
    let evaluation = state.services.promotions.evaluate(input).await?;
    Ok(Json(ApiResponse::success(evaluation)))
}
