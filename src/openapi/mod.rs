use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{
    catalog, customers, health, inventory, procurement, promotions, rate_limits, reports, sales,
    updates,
};
use crate::models;
use crate::services;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales API",
        version = "1.0.0",
        description = r#"
# Sales Management API

Back office for a retail operation: customers, categories and products,
stock levels, suppliers and purchase orders, sales and returns, promotions
and reporting. Desktop clients also fetch signed JAR builds from the
update endpoints.

## Rate Limiting

Requests are throttled per client (`X-Client-Id`, then the forwarded IP).
Allowed responses carry:
- `X-RateLimit-Limit`: Maximum requests per window
- `X-RateLimit-Remaining`: Requests left in the current window
- `X-RateLimit-Reset`: Seconds until the window resets

Repeated violations block the client for an exponentially growing period;
blocked requests receive `429` with a `Retry-After` header.

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100)
and return `items`, `total`, `page`, `per_page` and `total_pages`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "customers", description = "Customer records, history and stats"),
        (name = "catalog", description = "Categories and products"),
        (name = "inventory", description = "Stock levels and movements"),
        (name = "procurement", description = "Suppliers and purchase orders"),
        (name = "sales", description = "Point of sale transactions"),
        (name = "returns", description = "Returns against completed sales"),
        (name = "promotions", description = "Discount rules and evaluation"),
        (name = "reports", description = "Sales, stock and return analytics"),
        (name = "updates", description = "Desktop client builds and downloads"),
        (name = "rate-limits", description = "Throttling administration"),
        (name = "health", description = "Liveness and status")
    ),
    paths(
        health::health_check,
        crate::api_status,

        customers::list_customers,
        customers::create_customer,
        customers::get_customer,
        customers::update_customer,
        customers::delete_customer,
        customers::customer_history,
        customers::customer_stats,

        catalog::list_categories,
        catalog::create_category,
        catalog::get_category,
        catalog::update_category,
        catalog::delete_category,
        catalog::list_products,
        catalog::create_product,
        catalog::get_product,
        catalog::update_product,
        catalog::delete_product,

        inventory::list_inventory,
        inventory::low_stock,
        inventory::get_inventory,
        inventory::set_stock,
        inventory::adjust_stock,
        inventory::restock,
        inventory::update_levels,

        procurement::list_suppliers,
        procurement::create_supplier,
        procurement::get_supplier,
        procurement::update_supplier,
        procurement::delete_supplier,
        procurement::supplier_orders,
        procurement::list_purchase_orders,
        procurement::create_purchase_order,
        procurement::get_purchase_order,
        procurement::approve_purchase_order,
        procurement::receive_purchase_order,
        procurement::cancel_purchase_order,

        sales::list_sales,
        sales::create_sale,
        sales::get_sale,
        sales::complete_sale,
        sales::cancel_sale,
        sales::list_returns,
        sales::create_return,
        sales::get_return,
        sales::approve_return,
        sales::reject_return,
        sales::complete_return,

        promotions::list_promotions,
        promotions::create_promotion,
        promotions::get_promotion,
        promotions::update_promotion,
        promotions::deactivate_promotion,
        promotions::evaluate_promotion,

        reports::sales_summary,
        reports::daily_sales,
        reports::top_products,
        reports::sales_by_category,
        reports::top_customers,
        reports::inventory_valuation,
        reports::returns_summary,
        reports::promotion_performance,

        updates::list_versions,
        updates::upload_version,
        updates::get_version,
        updates::delete_version,
        updates::activate_version,
        updates::deactivate_version,
        updates::latest_version,
        updates::check_for_update,
        updates::download,
        updates::complete_download,
        updates::fail_download,
        updates::download_stats,
        updates::list_clients,
        updates::heartbeat,
        updates::client_stats,

        rate_limits::list_blocked,
        rate_limits::reset_client,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::ApiStatus,
            crate::errors::ErrorResponse,
            health::HealthResponse,
            health::ComponentHealth,
            health::ComponentStatus,

            models::customer::Model,
            models::CustomerType,
            models::category::Model,
            models::product::Model,
            models::inventory::Model,
            models::supplier::Model,
            models::purchase_order::Model,
            models::purchase_order_item::Model,
            models::PurchaseOrderStatus,
            models::sale::Model,
            models::sale_item::Model,
            models::SaleStatus,
            models::sales_return::Model,
            models::return_item::Model,
            models::ReturnStatus,
            models::promotion::Model,
            models::applied_promotion::Model,
            models::PromotionType,
            models::application_version::Model,
            models::update_download::Model,
            models::DownloadStatus,
            models::connected_client::Model,

            services::customers::CreateCustomerInput,
            services::customers::UpdateCustomerInput,
            services::customers::DeleteOutcome,
            services::customers::CustomerHistory,
            services::customers::CustomerStats,
            services::categories::CreateCategoryInput,
            services::categories::UpdateCategoryInput,
            services::products::CreateProductInput,
            services::products::UpdateProductInput,
            services::products::ProductDetail,
            services::products::ProductRemoval,
            services::inventory::AdjustStockInput,
            services::inventory::SetStockInput,
            services::inventory::RestockInput,
            services::inventory::UpdateLevelsInput,
            services::inventory::LowStockItem,
            services::suppliers::CreateSupplierInput,
            services::suppliers::UpdateSupplierInput,
            services::suppliers::SupplierRemoval,
            services::purchase_orders::CreatePurchaseOrderInput,
            services::purchase_orders::PurchaseOrderItemInput,
            services::purchase_orders::PurchaseOrderDetail,
            services::sales::CreateSaleInput,
            services::sales::SaleItemInput,
            services::sales::SaleDetail,
            services::returns::CreateReturnInput,
            services::returns::ReturnItemInput,
            services::returns::RejectReturnInput,
            services::returns::ReturnDetail,
            services::promotions::CreatePromotionInput,
            services::promotions::UpdatePromotionInput,
            services::promotions::EvaluatePromotionInput,
            services::promotions::EvaluateItem,
            services::promotions::PromotionEvaluation,
            services::promotions::Ineligible,
            services::reports::SalesSummary,
            services::reports::DailySales,
            services::reports::ProductSales,
            services::reports::CategorySales,
            services::reports::CustomerSales,
            services::reports::ValuationLine,
            services::reports::InventoryValuation,
            services::reports::ReturnsSummary,
            services::reports::PromotionPerformance,
            services::updates::UpdateCheck,
            services::updates::VersionDownloads,
            services::updates::DownloadStats,
            services::updates::HeartbeatInput,
            services::updates::ClientStats,
            updates::UploadVersionForm,
            updates::CompleteDownloadRequest,
            updates::FailDownloadRequest,
            crate::rate_limiter::BlockedClient,
            rate_limits::ResetOutcome,
        )
    )
)]
pub struct ApiDocV1;

/// Swagger UI at `/docs`, backed by the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url(OPENAPI_JSON_PATH, ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from(OPENAPI_JSON_PATH).try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Sales API"));
        for path in [
            "/api/v1/customers",
            "/api/v1/products/{id}",
            "/api/v1/inventory/{product_id}/adjust",
            "/api/v1/purchase-orders/{id}/receive",
            "/api/v1/sales/{id}/complete",
            "/api/v1/returns/{id}/approve",
            "/api/v1/promotions/evaluate",
            "/api/v1/reports/top-products",
            "/api/v1/updates/download/{path}",
            "/api/v1/rate-limits/blocked",
        ] {
            assert!(openapi.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn entity_schemas_use_readable_names() {
        let openapi = ApiDocV1::openapi();
        let schemas = &openapi.components.expect("components").schemas;
        for name in ["Customer", "Product", "Sale", "SalesReturn", "ApplicationVersion"] {
            assert!(schemas.contains_key(name), "missing schema {}", name);
        }
    }
}
