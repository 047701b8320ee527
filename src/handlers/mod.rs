pub mod catalog;
pub mod common;
pub mod customers;
pub mod health;
pub mod inventory;
pub mod procurement;
pub mod promotions;
pub mod rate_limits;
pub mod reports;
pub mod sales;
pub mod updates;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        categories::CategoryService, customers::CustomerService, inventory::InventoryService,
        products::ProductService, promotions::PromotionService,
        purchase_orders::PurchaseOrderService, reports::ReportService, returns::ReturnService,
        sales::SalesService, suppliers::SupplierService, updates::UpdateService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<CustomerService>,
    pub categories: Arc<CategoryService>,
    pub products: Arc<ProductService>,
    pub inventory: Arc<InventoryService>,
    pub suppliers: Arc<SupplierService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub sales: Arc<SalesService>,
    pub returns: Arc<ReturnService>,
    pub promotions: Arc<PromotionService>,
    pub reports: Arc<ReportService>,
    pub updates: Arc<UpdateService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        Self {
            customers: Arc::new(CustomerService::new(db_pool.clone(), event_sender.clone())),
            categories: Arc::new(CategoryService::new(db_pool.clone())),
            products: Arc::new(ProductService::new(db_pool.clone(), event_sender.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), event_sender.clone())),
            suppliers: Arc::new(SupplierService::new(db_pool.clone())),
            purchase_orders: Arc::new(PurchaseOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            sales: Arc::new(SalesService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.tax_rate(),
            )),
            returns: Arc::new(ReturnService::new(db_pool.clone(), event_sender.clone())),
            promotions: Arc::new(PromotionService::new(db_pool.clone())),
            reports: Arc::new(ReportService::new(db_pool.clone())),
            updates: Arc::new(UpdateService::new(db_pool, event_sender, &config.updates)),
        }
    }
}
