//! Suppliers and the purchase orders placed with them.

use super::common::{created_response, paginate, PaginationParams};
use crate::{
    errors::{ErrorResponse, ServiceError},
    models::{
        purchase_order::{self, PurchaseOrderStatus},
        supplier,
    },
    services::{
        purchase_orders::{CreatePurchaseOrderInput, PurchaseOrderDetail, PurchaseOrderFilter},
        suppliers::{CreateSupplierInput, SupplierRemoval, UpdateSupplierInput},
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
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
pub struct SupplierListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SupplierOrdersQuery {
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PurchaseOrderListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/suppliers", get(list_suppliers).post(create_supplier))
        .route(
            "/suppliers/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route("/suppliers/:id/purchase-orders", get(supplier_orders))
        .route(
            "/purchase-orders",
            get(list_purchase_orders).post(create_purchase_order),
        )
        .route("/purchase-orders/:id", get(get_purchase_order))
        .route("/purchase-orders/:id/approve", post(approve_purchase_order))
        .route("/purchase-orders/:id/receive", post(receive_purchase_order))
        .route("/purchase-orders/:id/cancel", post(cancel_purchase_order))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers",
    params(SupplierListQuery),
    responses((status = 200, description = "Suppliers page", body = ApiResponse<PaginatedResponse<supplier::Model>>)),
    tag = "procurement"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<SupplierListQuery>,
) -> ApiResult<PaginatedResponse<supplier::Model>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let (suppliers, total) = state
        .services
        .suppliers
        .list_suppliers(query.include_inactive, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(suppliers, total, params))))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers",
    request_body = CreateSupplierInput,
    responses(
        (status = 201, description = "Supplier created", body = ApiResponse<supplier::Model>),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    Json(input): Json<CreateSupplierInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.create_supplier(input).await?;
    Ok(created_response(supplier))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 200, description = "Supplier", body = ApiResponse<supplier::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<supplier::Model> {
    let supplier = state.services.suppliers.get_supplier(id).await?;
    Ok(Json(ApiResponse::success(supplier)))
}

#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}/purchase-orders",
    params(("id" = Uuid, Path, description = "Supplier id"), SupplierOrdersQuery),
    responses(
        (status = 200, description = "Orders placed with the supplier, newest first", body = ApiResponse<Vec<purchase_order::Model>>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn supplier_orders(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SupplierOrdersQuery>,
) -> ApiResult<Vec<purchase_order::Model>> {
    let orders = state
        .services
        .suppliers
        .supplier_orders(id, query.status)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    put,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    request_body = UpdateSupplierInput,
    responses(
        (status = 200, description = "Supplier updated", body = ApiResponse<supplier::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSupplierInput>,
) -> ApiResult<supplier::Model> {
    let supplier = state.services.suppliers.update_supplier(id, input).await?;
    Ok(Json(ApiResponse::success(supplier)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 200, description = "Deleted, or deactivated when products or orders reference it", body = ApiResponse<SupplierRemoval>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SupplierRemoval> {
    let removal = state.services.suppliers.delete_supplier(id).await?;
    Ok(Json(ApiResponse::success(removal)))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(PurchaseOrderListQuery),
    responses((status = 200, description = "Purchase orders page", body = ApiResponse<PaginatedResponse<purchase_order::Model>>)),
    tag = "procurement"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(query): Query<PurchaseOrderListQuery>,
) -> ApiResult<PaginatedResponse<purchase_order::Model>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let filter = PurchaseOrderFilter {
        status: query.status,
        supplier_id: query.supplier_id,
    };
    let (orders, total) = state
        .services
        .purchase_orders
        .list_purchase_orders(filter, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(orders, total, params))))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderInput,
    responses(
        (status = 201, description = "Purchase order created", body = ApiResponse<PurchaseOrderDetail>),
        (status = 400, description = "Invalid lines", body = ErrorResponse),
        (status = 422, description = "Supplier inactive", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .create_purchase_order(input)
        .await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order with lines", body = ApiResponse<PurchaseOrderDetail>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderDetail> {
    let order = state.services.purchase_orders.get_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/approve",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Approved", body = ApiResponse<purchase_order::Model>),
        (status = 422, description = "Not pending", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<purchase_order::Model> {
    let order = state
        .services
        .purchase_orders
        .approve_purchase_order(id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Received and restocked", body = ApiResponse<PurchaseOrderDetail>),
        (status = 422, description = "Not approved", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PurchaseOrderDetail> {
    let order = state
        .services
        .purchase_orders
        .receive_purchase_order(id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Cancelled", body = ApiResponse<purchase_order::Model>),
        (status = 422, description = "Already received or cancelled", body = ErrorResponse)
    ),
    tag = "procurement"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<purchase_order::Model> {
    let order = state
        .services
        .purchase_orders
        .cancel_purchase_order(id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
