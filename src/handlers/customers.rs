use super::common::{created_response, paginate, PaginationParams};
use crate::{
    errors::{ErrorResponse, ServiceError},
    models::customer::{self, CustomerType},
    services::customers::{
        CreateCustomerInput, CustomerFilter, CustomerHistory, CustomerStats, DeleteOutcome,
        UpdateCustomerInput,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CustomerListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Matches name or email
    pub search: Option<String>,
    #[param(value_type = Option<String>)]
    pub customer_type: Option<CustomerType>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DeleteCustomerQuery {
    /// Deactivate even when sales or returns reference the customer
    #[serde(default)]
    pub force: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/customers/:id/history", get(customer_history))
        .route("/customers/:id/stats", get(customer_stats))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers",
    params(CustomerListQuery),
    responses(
        (status = 200, description = "Customers page", body = ApiResponse<PaginatedResponse<customer::Model>>),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerListQuery>,
) -> ApiResult<PaginatedResponse<customer::Model>> {
    let params = PaginationParams::new(query.page, query.per_page);
    let filter = CustomerFilter {
        search: query.search,
        customer_type: query.customer_type,
        include_inactive: query.include_inactive,
    };
    let (customers, total) = state
        .services
        .customers
        .list_customers(filter, params.page, params.per_page)
        .await?;
    Ok(Json(ApiResponse::success(paginate(customers, total, params))))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = CreateCustomerInput,
    responses(
        (status = 201, description = "Customer created", body = ApiResponse<customer::Model>),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<CreateCustomerInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.create_customer(input).await?;
    Ok(created_response(customer))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer", body = ApiResponse<customer::Model>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<customer::Model> {
    let customer = state.services.customers.get_customer(id).await?;
    Ok(Json(ApiResponse::success(customer)))
}

#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = UpdateCustomerInput,
    responses(
        (status = 200, description = "Customer updated", body = ApiResponse<customer::Model>),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCustomerInput>,
) -> ApiResult<customer::Model> {
    let customer = state.services.customers.update_customer(id, input).await?;
    Ok(Json(ApiResponse::success(customer)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customers/{id}",
    params(("id" = Uuid, Path, description = "Customer id"), DeleteCustomerQuery),
    responses(
        (status = 200, description = "Customer deleted or deactivated", body = ApiResponse<DeleteOutcome>),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 422, description = "Customer has sales or returns", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteCustomerQuery>,
) -> ApiResult<DeleteOutcome> {
    let outcome = state
        .services
        .customers
        .delete_customer(id, query.force)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/history",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Sales and returns of the customer", body = ApiResponse<CustomerHistory>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn customer_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CustomerHistory> {
    let history = state.services.customers.get_customer_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/stats",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Purchase statistics", body = ApiResponse<CustomerStats>),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn customer_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CustomerStats> {
    let stats = state.services.customers.customer_stats(id).await?;
    Ok(Json(ApiResponse::success(stats)))
}
