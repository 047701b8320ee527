use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{category, inventory, product, purchase_order_item, sale_item, supplier},
    services::{
        inventory::create_inventory_row, normalize_optional, page_window, round_money,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub price: Decimal,
    #[serde(default)]
    pub cost_price: Decimal,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub initial_stock: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
    #[validate(range(min = 0))]
    pub max_stock_level: Option<i32>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: product::Model,
    pub inventory: Option<inventory::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductRemoval {
    Deleted,
    Deactivated,
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates the product together with its stock row.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductDetail, ServiceError> {
        input.validate()?;
        ensure_non_negative("price", input.price)?;
        ensure_non_negative("cost_price", input.cost_price)?;
        if let Some(max) = input.max_stock_level {
            if max < input.min_stock_level {
                return Err(ServiceError::ValidationError(
                    "max_stock_level must not be below min_stock_level".into(),
                ));
            }
        }

        let sku = normalize_sku(&input.sku);
        self.ensure_unique_sku(&sku, None).await?;
        self.ensure_references(input.category_id, input.supplier_id)
            .await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(normalize_optional(input.description)),
            sku: Set(sku),
            price: Set(round_money(input.price)),
            cost_price: Set(round_money(input.cost_price)),
            category_id: Set(input.category_id),
            supplier_id: Set(input.supplier_id),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        let stock = create_inventory_row(
            &txn,
            product.id,
            input.initial_stock,
            input.min_stock_level,
            input.max_stock_level,
            normalize_optional(input.location),
        )
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;
        info!(product_id = %product.id, "Created product");
        Ok(ProductDetail {
            product,
            inventory: Some(stock),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    #[instrument(skip(self))]
    pub async fn get_product_detail(&self, id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = self.get_product(id).await?;
        let inventory = product
            .find_related(inventory::Entity)
            .one(&*self.db)
            .await?;
        Ok(ProductDetail { product, inventory })
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = product::Entity::find();

        if let Some(search) = normalize_optional(filter.search) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(&search))
                    .add(product::Column::Sku.contains(search.to_uppercase())),
            );
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(product::Column::SupplierId.eq(supplier_id));
        }
        query = query.filter(product::Column::IsActive.eq(filter.is_active.unwrap_or(true)));

        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let products = query
            .order_by_asc(product::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((products, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_product(id).await?;
        self.ensure_references(input.category_id, input.supplier_id)
            .await?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(sku) = input.sku {
            let sku = normalize_sku(&sku);
            self.ensure_unique_sku(&sku, Some(id)).await?;
            active.sku = Set(sku);
        }
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(normalize_optional(input.description));
        }
        if let Some(price) = input.price {
            ensure_non_negative("price", price)?;
            active.price = Set(round_money(price));
        }
        if let Some(cost_price) = input.cost_price {
            ensure_non_negative("cost_price", cost_price)?;
            active.cost_price = Set(round_money(cost_price));
        }
        if input.category_id.is_some() {
            active.category_id = Set(input.category_id);
        }
        if input.supplier_id.is_some() {
            active.supplier_id = Set(input.supplier_id);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(product_id = %id, "Updated product");
        Ok(product)
    }

    /// Products already used on a sale or purchase order are deactivated so
    /// the documents keep resolving; unused products are removed outright.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<ProductRemoval, ServiceError> {
        let product = self.get_product(id).await?;

        let sold = sale_item::Entity::find()
            .filter(sale_item::Column::ProductId.eq(id))
            .count(&*self.db)
            .await?;
        let ordered = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::ProductId.eq(id))
            .count(&*self.db)
            .await?;

        if sold > 0 || ordered > 0 {
            let mut active: product::ActiveModel = product.into();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
            self.event_sender
                .send_or_log(Event::ProductDeactivated(id))
                .await;
            info!(product_id = %id, "Deactivated product with history");
            return Ok(ProductRemoval::Deactivated);
        }

        let txn = self.db.begin().await?;
        inventory::Entity::delete_many()
            .filter(inventory::Column::ProductId.eq(id))
            .exec(&txn)
            .await?;
        product.delete(&txn).await?;
        txn.commit().await?;

        info!(product_id = %id, "Deleted product");
        Ok(ProductRemoval::Deleted)
    }

    async fn ensure_unique_sku(&self, sku: &str, exclude: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::Sku.eq(sku));
        if let Some(id) = exclude {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::DataIntegrity(format!(
                "Product with SKU {} already exists",
                sku
            )));
        }
        Ok(())
    }

    async fn ensure_references(
        &self,
        category_id: Option<Uuid>,
        supplier_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(category_id) = category_id {
            category::Entity::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Category", category_id))?;
        }
        if let Some(supplier_id) = supplier_id {
            let supplier = supplier::Entity::find_by_id(supplier_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))?;
            if !supplier.is_active {
                return Err(ServiceError::BusinessLogic(format!(
                    "Supplier {} is inactive",
                    supplier.name
                )));
            }
        }
        Ok(())
    }
}

fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_prices_are_rejected() {
        assert!(ensure_non_negative("price", dec!(-0.01)).is_err());
        assert!(ensure_non_negative("price", dec!(0)).is_ok());
        assert!(ensure_non_negative("price", dec!(12.50)).is_ok());
    }

    #[test]
    fn skus_are_upper_cased() {
        assert_eq!(normalize_sku(" ab-12 "), "AB-12");
    }
}
