use super::common::{paginate, PaginationParams};
use crate::{
    errors::ErrorResponse,
    models::inventory,
    services::inventory::{
        AdjustStockInput, LowStockItem, RestockInput, SetStockInput, UpdateLevelsInput,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_inventory))
        .route("/inventory/low-stock", get(low_stock))
        .route(
            "/inventory/:product_id",
            get(get_inventory).put(set_stock),
        )
        .route("/inventory/:product_id/adjust", post(adjust_stock))
        .route("/inventory/:product_id/restock", post(restock))
        .route("/inventory/:product_id/levels", put(update_levels))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(PaginationParams),
    responses(
        (status = 200, description = "Inventory page", body = ApiResponse<PaginatedResponse<inventory::Model>>,
            headers(
                ("X-RateLimit-Limit" = String, description = "Requests allowed in current window"),
                ("X-RateLimit-Remaining" = String, description = "Remaining requests in window"),
                ("X-RateLimit-Reset" = String, description = "Seconds until window resets"),
            )
        ),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<inventory::Model>> {
    let (rows, total) = state
        .services
        .inventory
        .list_inventory(params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(rows, total, params))))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    responses((status = 200, description = "Products at or below their minimum level", body = ApiResponse<Vec<LowStockItem>>)),
    tag = "inventory"
)]
pub async fn low_stock(State(state): State<AppState>) -> ApiResult<Vec<LowStockItem>> {
    let items = state.services.inventory.low_stock().await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Stock record", body = ApiResponse<inventory::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<inventory::Model> {
    let row = state.services.inventory.get_by_product(product_id).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = SetStockInput,
    responses(
        (status = 200, description = "Stock set to an absolute quantity", body = ApiResponse<inventory::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn set_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<SetStockInput>,
) -> ApiResult<inventory::Model> {
    let row = state.services.inventory.set_stock(product_id, input).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/{product_id}/adjust",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = AdjustStockInput,
    responses(
        (status = 200, description = "Stock adjusted", body = ApiResponse<inventory::Model>),
        (status = 409, description = "Adjustment would make stock negative", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<AdjustStockInput>,
) -> ApiResult<inventory::Model> {
    let row = state
        .services
        .inventory
        .adjust_stock(product_id, input)
        .await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/{product_id}/restock",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = RestockInput,
    responses(
        (status = 200, description = "Stock received", body = ApiResponse<inventory::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn restock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<RestockInput>,
) -> ApiResult<inventory::Model> {
    let row = state.services.inventory.restock(product_id, input).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[utoipa::path(
    put,
    path = "/api/v1/inventory/{product_id}/levels",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = UpdateLevelsInput,
    responses(
        (status = 200, description = "Reorder levels updated", body = ApiResponse<inventory::Model>),
        (status = 400, description = "Minimum above maximum", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn update_levels(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateLevelsInput>,
) -> ApiResult<inventory::Model> {
    let row = state
        .services
        .inventory
        .update_levels(product_id, input)
        .await?;
    Ok(Json(ApiResponse::success(row)))
}
