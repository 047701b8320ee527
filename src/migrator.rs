use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_purchasing_tables::Migration),
            Box::new(m20240101_000003_create_sales_tables::Migration),
            Box::new(m20240101_000004_create_update_tables::Migration),
            Box::new(m20240101_000005_create_rate_limit_trackers::Migration),
        ]
    }
}

fn id_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().primary_key().to_owned()
}

fn money_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

fn ts_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

fn unique_index<T: IntoIden + 'static>(
    name: &str,
    table: T,
    cols: Vec<DynIden>,
) -> IndexCreateStatement {
    let mut index = Index::create();
    index.if_not_exists().name(name).table(table).unique();
    for col in cols {
        index.col(col);
    }
    index.to_owned()
}

mod m20240101_000001_create_catalog_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(id_col(Customers::Id))
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::Address).string().null())
                        .col(ColumnDef::new(Customers::CustomerType).string_len(32).not_null())
                        .col(money_col(Customers::TotalPurchases))
                        .col(
                            ColumnDef::new(Customers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ts_col(Customers::CreatedAt))
                        .col(ts_col(Customers::UpdatedAt))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_customers_email",
                    Customers::Table,
                    vec![Customers::Email.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(id_col(Categories::Id))
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(ColumnDef::new(Categories::Description).text().null())
                        .col(
                            ColumnDef::new(Categories::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ts_col(Categories::CreatedAt))
                        .col(ts_col(Categories::UpdatedAt))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_categories_name",
                    Categories::Table,
                    vec![Categories::Name.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(id_col(Suppliers::Id))
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::ContactName).string().null())
                        .col(ColumnDef::new(Suppliers::Email).string().null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).string().null())
                        .col(
                            ColumnDef::new(Suppliers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ts_col(Suppliers::CreatedAt))
                        .col(ts_col(Suppliers::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(id_col(Products::Id))
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(money_col(Products::Price))
                        .col(money_col(Products::CostPrice))
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ts_col(Products::CreatedAt))
                        .col(ts_col(Products::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category_id")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_supplier_id")
                                .from(Products::Table, Products::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_products_sku",
                    Products::Table,
                    vec![Products::Sku.into_iden()],
                ))
                .await?;
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Inventory::Table)
                        .if_not_exists()
                        .col(id_col(Inventory::Id))
                        .col(ColumnDef::new(Inventory::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(Inventory::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Inventory::MinStockLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Inventory::MaxStockLevel).integer().null())
                        .col(ColumnDef::new(Inventory::Location).string().null())
                        .col(
                            ColumnDef::new(Inventory::LastRestockedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ts_col(Inventory::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_product_id")
                                .from(Inventory::Table, Inventory::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_inventory_product_id",
                    Inventory::Table,
                    vec![Inventory::ProductId.into_iden()],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                Inventory::Table.into_iden(),
                Products::Table.into_iden(),
                Suppliers::Table.into_iden(),
                Categories::Table.into_iden(),
                Customers::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).if_exists().to_owned())
                    .await?;
            }
            Ok(())
        }
    }
}

mod m20240101_000002_create_purchasing_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_purchasing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(id_col(PurchaseOrders::Id))
                        .col(ColumnDef::new(PurchaseOrders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ExpectedDeliveryDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(money_col(PurchaseOrders::TotalAmount))
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ts_col(PurchaseOrders::CreatedAt))
                        .col(ts_col(PurchaseOrders::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_supplier_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_purchase_orders_number",
                    PurchaseOrders::Table,
                    vec![PurchaseOrders::OrderNumber.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(id_col(PurchaseOrderItems::Id))
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrderItems::Quantity).integer().not_null())
                        .col(money_col(PurchaseOrderItems::UnitCost))
                        .col(money_col(PurchaseOrderItems::LineTotal))
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ReceivedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_order_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_product_id")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }
}

mod m20240101_000003_create_sales_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Promotions::Table)
                        .if_not_exists()
                        .col(id_col(Promotions::Id))
                        .col(ColumnDef::new(Promotions::Name).string().not_null())
                        .col(ColumnDef::new(Promotions::Description).text().null())
                        .col(ColumnDef::new(Promotions::Code).string().not_null())
                        .col(ColumnDef::new(Promotions::PromotionType).string_len(32).not_null())
                        .col(money_col(Promotions::DiscountValue))
                        .col(ColumnDef::new(Promotions::MaxDiscountAmount).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Promotions::MinOrderAmount).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Promotions::CustomerType).string_len(32).null())
                        .col(ColumnDef::new(Promotions::CategoryIds).json().not_null())
                        .col(ColumnDef::new(Promotions::ProductIds).json().not_null())
                        .col(ts_col(Promotions::StartDate))
                        .col(ts_col(Promotions::EndDate))
                        .col(ColumnDef::new(Promotions::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(Promotions::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Promotions::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ts_col(Promotions::CreatedAt))
                        .col(ts_col(Promotions::UpdatedAt))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_promotions_code",
                    Promotions::Table,
                    vec![Promotions::Code.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(id_col(Sales::Id))
                        .col(ColumnDef::new(Sales::SaleNumber).string().not_null())
                        .col(ColumnDef::new(Sales::CustomerId).uuid().null())
                        .col(ColumnDef::new(Sales::Status).string_len(32).not_null())
                        .col(money_col(Sales::Subtotal))
                        .col(money_col(Sales::DiscountAmount))
                        .col(money_col(Sales::TaxAmount))
                        .col(money_col(Sales::TotalAmount))
                        .col(ColumnDef::new(Sales::PaymentMethod).string().null())
                        .col(ColumnDef::new(Sales::Notes).text().null())
                        .col(ts_col(Sales::CreatedAt))
                        .col(ts_col(Sales::UpdatedAt))
                        .col(
                            ColumnDef::new(Sales::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_customer_id")
                                .from(Sales::Table, Sales::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_sales_number",
                    Sales::Table,
                    vec![Sales::SaleNumber.into_iden()],
                ))
                .await?;
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_created_at")
                        .table(Sales::Table)
                        .col(Sales::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleItems::Table)
                        .if_not_exists()
                        .col(id_col(SaleItems::Id))
                        .col(ColumnDef::new(SaleItems::SaleId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SaleItems::Quantity).integer().not_null())
                        .col(money_col(SaleItems::UnitPrice))
                        .col(money_col(SaleItems::DiscountAmount))
                        .col(money_col(SaleItems::LineTotal))
                        .col(
                            ColumnDef::new(SaleItems::ReturnedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_items_sale_id")
                                .from(SaleItems::Table, SaleItems::SaleId)
                                .to(Sales::Table, Sales::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_items_product_id")
                                .from(SaleItems::Table, SaleItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AppliedPromotions::Table)
                        .if_not_exists()
                        .col(id_col(AppliedPromotions::Id))
                        .col(ColumnDef::new(AppliedPromotions::SaleId).uuid().not_null())
                        .col(ColumnDef::new(AppliedPromotions::PromotionId).uuid().not_null())
                        .col(ColumnDef::new(AppliedPromotions::PromotionCode).string().not_null())
                        .col(money_col(AppliedPromotions::DiscountAmount))
                        .col(ts_col(AppliedPromotions::AppliedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_applied_promotions_sale_id")
                                .from(AppliedPromotions::Table, AppliedPromotions::SaleId)
                                .to(Sales::Table, Sales::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_applied_promotions_promotion_id")
                                .from(AppliedPromotions::Table, AppliedPromotions::PromotionId)
                                .to(Promotions::Table, Promotions::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Returns::Table)
                        .if_not_exists()
                        .col(id_col(Returns::Id))
                        .col(ColumnDef::new(Returns::ReturnNumber).string().not_null())
                        .col(ColumnDef::new(Returns::SaleId).uuid().not_null())
                        .col(ColumnDef::new(Returns::CustomerId).uuid().null())
                        .col(ColumnDef::new(Returns::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Returns::Reason).text().not_null())
                        .col(money_col(Returns::TotalRefund))
                        .col(ColumnDef::new(Returns::RefundMethod).string().null())
                        .col(ColumnDef::new(Returns::RejectionReason).text().null())
                        .col(ts_col(Returns::CreatedAt))
                        .col(ts_col(Returns::UpdatedAt))
                        .col(
                            ColumnDef::new(Returns::RefundedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_returns_sale_id")
                                .from(Returns::Table, Returns::SaleId)
                                .to(Sales::Table, Sales::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_returns_customer_id")
                                .from(Returns::Table, Returns::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_returns_number",
                    Returns::Table,
                    vec![Returns::ReturnNumber.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnItems::Table)
                        .if_not_exists()
                        .col(id_col(ReturnItems::Id))
                        .col(ColumnDef::new(ReturnItems::ReturnId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::SaleItemId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                        .col(money_col(ReturnItems::RefundAmount))
                        .col(
                            ColumnDef::new(ReturnItems::Restock)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_items_return_id")
                                .from(ReturnItems::Table, ReturnItems::ReturnId)
                                .to(Returns::Table, Returns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_items_sale_item_id")
                                .from(ReturnItems::Table, ReturnItems::SaleItemId)
                                .to(SaleItems::Table, SaleItems::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                ReturnItems::Table.into_iden(),
                Returns::Table.into_iden(),
                AppliedPromotions::Table.into_iden(),
                SaleItems::Table.into_iden(),
                Sales::Table.into_iden(),
                Promotions::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).if_exists().to_owned())
                    .await?;
            }
            Ok(())
        }
    }
}

mod m20240101_000004_create_update_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_update_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ApplicationVersions::Table)
                        .if_not_exists()
                        .col(id_col(ApplicationVersions::Id))
                        .col(ColumnDef::new(ApplicationVersions::Version).string_len(64).not_null())
                        .col(ColumnDef::new(ApplicationVersions::FileName).string().not_null())
                        .col(ColumnDef::new(ApplicationVersions::FilePath).string().not_null())
                        .col(ColumnDef::new(ApplicationVersions::FileSize).big_integer().not_null())
                        .col(ColumnDef::new(ApplicationVersions::Checksum).string_len(64).not_null())
                        .col(ColumnDef::new(ApplicationVersions::ReleaseNotes).text().null())
                        .col(
                            ColumnDef::new(ApplicationVersions::IsMandatory)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ApplicationVersions::MinSupportedVersion)
                                .string_len(64)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ApplicationVersions::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ApplicationVersions::DownloadCount)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ts_col(ApplicationVersions::UploadedAt))
                        .col(ts_col(ApplicationVersions::UpdatedAt))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_application_versions_version",
                    ApplicationVersions::Table,
                    vec![ApplicationVersions::Version.into_iden()],
                ))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UpdateDownloads::Table)
                        .if_not_exists()
                        .col(id_col(UpdateDownloads::Id))
                        .col(ColumnDef::new(UpdateDownloads::VersionId).uuid().not_null())
                        .col(ColumnDef::new(UpdateDownloads::ClientId).string().null())
                        .col(ColumnDef::new(UpdateDownloads::IpAddress).string().null())
                        .col(ColumnDef::new(UpdateDownloads::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(UpdateDownloads::BytesTransferred)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(UpdateDownloads::ErrorMessage).text().null())
                        .col(ts_col(UpdateDownloads::StartedAt))
                        .col(
                            ColumnDef::new(UpdateDownloads::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_update_downloads_version_id")
                                .from(UpdateDownloads::Table, UpdateDownloads::VersionId)
                                .to(ApplicationVersions::Table, ApplicationVersions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ConnectedClients::Table)
                        .if_not_exists()
                        .col(id_col(ConnectedClients::Id))
                        .col(ColumnDef::new(ConnectedClients::ClientId).string().not_null())
                        .col(ColumnDef::new(ConnectedClients::Hostname).string().null())
                        .col(ColumnDef::new(ConnectedClients::IpAddress).string().null())
                        .col(ColumnDef::new(ConnectedClients::AppVersion).string_len(64).null())
                        .col(ColumnDef::new(ConnectedClients::OsInfo).string().null())
                        .col(ts_col(ConnectedClients::FirstSeen))
                        .col(ts_col(ConnectedClients::LastSeen))
                        .col(
                            ColumnDef::new(ConnectedClients::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_connected_clients_client_id",
                    ConnectedClients::Table,
                    vec![ConnectedClients::ClientId.into_iden()],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                ConnectedClients::Table.into_iden(),
                UpdateDownloads::Table.into_iden(),
                ApplicationVersions::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).if_exists().to_owned())
                    .await?;
            }
            Ok(())
        }
    }
}

mod m20240101_000005_create_rate_limit_trackers {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_rate_limit_trackers"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RateLimitTrackers::Table)
                        .if_not_exists()
                        .col(id_col(RateLimitTrackers::Id))
                        .col(ColumnDef::new(RateLimitTrackers::ClientId).string().not_null())
                        .col(ColumnDef::new(RateLimitTrackers::Endpoint).string().not_null())
                        .col(
                            ColumnDef::new(RateLimitTrackers::RequestCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RateLimitTrackers::PreviousCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ts_col(RateLimitTrackers::WindowStart))
                        .col(
                            ColumnDef::new(RateLimitTrackers::ViolationCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RateLimitTrackers::BlockedUntil)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(RateLimitTrackers::LastViolationAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ts_col(RateLimitTrackers::LastRequestAt))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(unique_index(
                    "idx_rate_limit_trackers_client_endpoint",
                    RateLimitTrackers::Table,
                    vec![
                        RateLimitTrackers::ClientId.into_iden(),
                        RateLimitTrackers::Endpoint.into_iden(),
                    ],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RateLimitTrackers::Table).to_owned())
                .await
        }
    }
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    Name,
    Email,
    Phone,
    Address,
    CustomerType,
    TotalPurchases,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
    Description,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Suppliers {
    Table,
    Id,
    Name,
    ContactName,
    Email,
    Phone,
    Address,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Description,
    Sku,
    Price,
    CostPrice,
    CategoryId,
    SupplierId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Inventory {
    Table,
    Id,
    ProductId,
    Quantity,
    MinStockLevel,
    MaxStockLevel,
    Location,
    LastRestockedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PurchaseOrders {
    Table,
    Id,
    OrderNumber,
    SupplierId,
    Status,
    ExpectedDeliveryDate,
    ReceivedAt,
    TotalAmount,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PurchaseOrderItems {
    Table,
    Id,
    PurchaseOrderId,
    ProductId,
    Quantity,
    UnitCost,
    LineTotal,
    ReceivedQuantity,
}

#[derive(DeriveIden)]
enum Promotions {
    Table,
    Id,
    Name,
    Description,
    Code,
    PromotionType,
    DiscountValue,
    MaxDiscountAmount,
    MinOrderAmount,
    CustomerType,
    CategoryIds,
    ProductIds,
    StartDate,
    EndDate,
    UsageLimit,
    UsageCount,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Sales {
    Table,
    Id,
    SaleNumber,
    CustomerId,
    Status,
    Subtotal,
    DiscountAmount,
    TaxAmount,
    TotalAmount,
    PaymentMethod,
    Notes,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum SaleItems {
    Table,
    Id,
    SaleId,
    ProductId,
    Quantity,
    UnitPrice,
    DiscountAmount,
    LineTotal,
    ReturnedQuantity,
}

#[derive(DeriveIden)]
enum AppliedPromotions {
    Table,
    Id,
    SaleId,
    PromotionId,
    PromotionCode,
    DiscountAmount,
    AppliedAt,
}

#[derive(DeriveIden)]
enum Returns {
    Table,
    Id,
    ReturnNumber,
    SaleId,
    CustomerId,
    Status,
    Reason,
    TotalRefund,
    RefundMethod,
    RejectionReason,
    CreatedAt,
    UpdatedAt,
    RefundedAt,
}

#[derive(DeriveIden)]
enum ReturnItems {
    Table,
    Id,
    ReturnId,
    SaleItemId,
    ProductId,
    Quantity,
    RefundAmount,
    Restock,
}

#[derive(DeriveIden)]
enum ApplicationVersions {
    Table,
    Id,
    Version,
    FileName,
    FilePath,
    FileSize,
    Checksum,
    ReleaseNotes,
    IsMandatory,
    MinSupportedVersion,
    IsActive,
    DownloadCount,
    UploadedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UpdateDownloads {
    Table,
    Id,
    VersionId,
    ClientId,
    IpAddress,
    Status,
    BytesTransferred,
    ErrorMessage,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum ConnectedClients {
    Table,
    Id,
    ClientId,
    Hostname,
    IpAddress,
    AppVersion,
    OsInfo,
    FirstSeen,
    LastSeen,
    IsActive,
}

#[derive(DeriveIden)]
enum RateLimitTrackers {
    Table,
    Id,
    ClientId,
    Endpoint,
    RequestCount,
    PreviousCount,
    WindowStart,
    ViolationCount,
    BlockedUntil,
    LastViolationAt,
    LastRequestAt,
}
