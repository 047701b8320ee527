use super::common::{created_response, paginate, PaginationParams};
use crate::{
    errors::{ErrorResponse, ServiceError},
    models::{
        sale::{self, SaleStatus},
        sales_return::{self, ReturnStatus},
    },
    services::{
        returns::{CreateReturnInput, RejectReturnInput, ReturnDetail, ReturnFilter},
        sales::{CreateSaleInput, SaleDetail, SaleFilter},
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SaleListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<SaleStatus>,
    pub customer_id: Option<Uuid>,
    /// Inclusive lower bound on the sale date (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the sale date (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReturnListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<ReturnStatus>,
    pub sale_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/:id", get(get_sale))
        .route("/sales/:id/complete", post(complete_sale))
        .route("/sales/:id/cancel", post(cancel_sale))
        .route("/returns", get(list_returns).post(create_return))
        .route("/returns/:id", get(get_return))
        .route("/returns/:id/approve", post(approve_return))
        .route("/returns/:id/reject", post(reject_return))
        .route("/returns/:id/complete", post(complete_return))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales",
    params(SaleListQuery),
    responses((status = 200, description = "Sales page, newest first", body = ApiResponse<PaginatedResponse<sale::Model>>)),
    tag = "sales"
)]
pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<SaleListQuery>,
) -> ApiResult<PaginatedResponse<sale::Model>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let filter = SaleFilter {
        status: query.status,
        customer_id: query.customer_id,
        from: query.from,
        to: query.to,
    };
    let (sales, total) = state
        .services
        .sales
        .list_sales(filter, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(sales, total, params))))
}

/// Records a sale: prices lines, applies promotion codes, computes tax and
/// takes the sold quantities out of stock in one transaction.
#[utoipa::path(
    post,
    path = "/api/v1/sales",
    request_body = CreateSaleInput,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<SaleDetail>),
        (status = 400, description = "Invalid lines", body = ErrorResponse),
        (status = 409, description = "Insufficient stock", body = ErrorResponse),
        (status = 422, description = "Inactive customer or product, or ineligible promotion", body = ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state.services.sales.create_sale(input).await?;
    Ok(created_response(sale))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales/{id}",
    params(("id" = Uuid, Path, description = "Sale id")),
    responses(
        (status = 200, description = "Sale with lines and applied promotions", body = ApiResponse<SaleDetail>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn get_sale(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SaleDetail> {
    let sale = state.services.sales.get_sale(id).await?;
    Ok(Json(ApiResponse::success(sale)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/{id}/complete",
    params(("id" = Uuid, Path, description = "Sale id")),
    responses(
        (status = 200, description = "Sale completed", body = ApiResponse<sale::Model>),
        (status = 422, description = "Sale is not pending", body = ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn complete_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sale::Model> {
    let sale = state.services.sales.complete_sale(id).await?;
    Ok(Json(ApiResponse::success(sale)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/{id}/cancel",
    params(("id" = Uuid, Path, description = "Sale id")),
    responses(
        (status = 200, description = "Sale cancelled and stock restored", body = ApiResponse<sale::Model>),
        (status = 422, description = "Sale cannot be cancelled", body = ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sale::Model> {
    let sale = state.services.sales.cancel_sale(id).await?;
    Ok(Json(ApiResponse::success(sale)))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns",
    params(ReturnListQuery),
    responses((status = 200, description = "Returns page", body = ApiResponse<PaginatedResponse<sales_return::Model>>)),
    tag = "returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<PaginatedResponse<sales_return::Model>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let filter = ReturnFilter {
        status: query.status,
        sale_id: query.sale_id,
        customer_id: query.customer_id,
    };
    let (returns, total) = state
        .services
        .returns
        .list_returns(filter, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(returns, total, params))))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns",
    request_body = CreateReturnInput,
    responses(
        (status = 201, description = "Return requested", body = ApiResponse<ReturnDetail>),
        (status = 422, description = "Sale not returnable or quantity too high", body = ErrorResponse)
    ),
    tag = "returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    Json(input): Json<CreateReturnInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.returns.create_return(input).await?;
    Ok(created_response(detail))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns/{id}",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "Return with lines", body = ApiResponse<ReturnDetail>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnDetail> {
    let detail = state.services.returns.get_return(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/approve",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "Return approved", body = ApiResponse<sales_return::Model>),
        (status = 422, description = "Return is not pending", body = ErrorResponse)
    ),
    tag = "returns"
)]
pub async fn approve_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sales_return::Model> {
    let sales_return = state.services.returns.approve_return(id).await?;
    Ok(Json(ApiResponse::success(sales_return)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/reject",
    params(("id" = Uuid, Path, description = "Return id")),
    request_body = RejectReturnInput,
    responses(
        (status = 200, description = "Return rejected", body = ApiResponse<sales_return::Model>),
        (status = 422, description = "Return is not pending", body = ErrorResponse)
    ),
    tag = "returns"
)]
pub async fn reject_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectReturnInput>,
) -> ApiResult<sales_return::Model> {
    let sales_return = state.services.returns.reject_return(id, input).await?;
    Ok(Json(ApiResponse::success(sales_return)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/complete",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "Refund issued and stock restored", body = ApiResponse<ReturnDetail>),
        (status = 422, description = "Return is not approved", body = ErrorResponse)
    ),
    tag = "returns"
)]
pub async fn complete_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnDetail> {
    let detail = state.services.returns.complete_return(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}
