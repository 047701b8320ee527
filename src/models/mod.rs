//! Database entities.

pub mod application_version;
pub mod applied_promotion;
pub mod category;
pub mod connected_client;
pub mod customer;
pub mod inventory;
pub mod product;
pub mod promotion;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod rate_limit_tracker;
pub mod return_item;
pub mod sale;
pub mod sale_item;
pub mod sales_return;
pub mod supplier;
pub mod update_download;

pub use customer::CustomerType;
pub use promotion::PromotionType;
pub use purchase_order::PurchaseOrderStatus;
pub use sale::SaleStatus;
pub use sales_return::ReturnStatus;
pub use update_download::DownloadStatus;
