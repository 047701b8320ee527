use crate::{
    errors::ErrorResponse,
    services::reports::{
        CategorySales, CustomerSales, DailySales, DateRange, InventoryValuation, ProductSales,
        PromotionPerformance, ReturnsSummary, SalesSummary,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

const DEFAULT_TOP: usize = 10;
const MAX_TOP: usize = 100;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TopQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Number of rows (default 10, at most 100)
    pub limit: Option<usize>,
}

impl TopQuery {
    fn range(&self) -> DateRange {
        DateRange {
            from: self.from,
            to: self.to,
        }
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports/sales-summary", get(sales_summary))
        .route("/reports/daily-sales", get(daily_sales))
        .route("/reports/top-products", get(top_products))
        .route("/reports/sales-by-category", get(sales_by_category))
        .route("/reports/top-customers", get(top_customers))
        .route("/reports/inventory-valuation", get(inventory_valuation))
        .route("/reports/returns-summary", get(returns_summary))
        .route("/reports/promotion-performance", get(promotion_performance))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/sales-summary",
    params(DateRange),
    responses(
        (status = 200, description = "Totals over completed sales", body = ApiResponse<SalesSummary>),
        (status = 400, description = "Bad date range", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn sales_summary(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<SalesSummary> {
    let summary = state.services.reports.sales_summary(range).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/daily-sales",
    params(DateRange),
    responses((status = 200, description = "Per-day totals", body = ApiResponse<Vec<DailySales>>)),
    tag = "reports"
)]
pub async fn daily_sales(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<Vec<DailySales>> {
    let days = state.services.reports.daily_sales(range).await?;
    Ok(Json(ApiResponse::success(days)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/top-products",
    params(TopQuery),
    responses((status = 200, description = "Best sellers by revenue", body = ApiResponse<Vec<ProductSales>>)),
    tag = "reports"
)]
pub async fn top_products(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Vec<ProductSales>> {
    let products = state
        .services
        .reports
        .top_products(query.range(), query.limit())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/sales-by-category",
    params(DateRange),
    responses((status = 200, description = "Revenue per category", body = ApiResponse<Vec<CategorySales>>)),
    tag = "reports"
)]
pub async fn sales_by_category(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<Vec<CategorySales>> {
    let categories = state.services.reports.sales_by_category(range).await?;
    Ok(Json(ApiResponse::success(categories)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/top-customers",
    params(TopQuery),
    responses((status = 200, description = "Customers by spend", body = ApiResponse<Vec<CustomerSales>>)),
    tag = "reports"
)]
pub async fn top_customers(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Vec<CustomerSales>> {
    let customers = state
        .services
        .reports
        .top_customers(query.range(), query.limit())
        .await?;
    Ok(Json(ApiResponse::success(customers)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/inventory-valuation",
    responses((status = 200, description = "Stock valued at cost and retail", body = ApiResponse<InventoryValuation>)),
    tag = "reports"
)]
pub async fn inventory_valuation(State(state): State<AppState>) -> ApiResult<InventoryValuation> {
    let valuation = state.services.reports.inventory_valuation().await?;
    Ok(Json(ApiResponse::success(valuation)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/returns-summary",
    params(DateRange),
    responses((status = 200, description = "Return counts, refunds and rate", body = ApiResponse<ReturnsSummary>)),
    tag = "reports"
)]
pub async fn returns_summary(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<ReturnsSummary> {
    let summary = state.services.reports.returns_summary(range).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/promotion-performance",
    params(DateRange),
    responses((status = 200, description = "Uses and discount per promotion", body = ApiResponse<Vec<PromotionPerformance>>)),
    tag = "reports"
)]
pub async fn promotion_performance(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<Vec<PromotionPerformance>> {
    let performance = state.services.reports.promotion_performance(range).await?;
    Ok(Json(ApiResponse::success(performance)))
}
