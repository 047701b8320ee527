use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{inventory, product},
    services::page_window,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustStockInput {
    /// Signed change; negative values remove stock
    #[validate(custom = "non_zero")]
    pub quantity_change: i32,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SetStockInput {
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RestockInput {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLevelsInput {
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    #[validate(range(min = 0))]
    pub max_stock_level: Option<i32>,
    pub location: Option<String>,
}

fn non_zero(value: i32) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::new("quantity_change_zero"));
    }
    Ok(())
}

/// Before/after figures of one stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: Uuid,
    pub old_quantity: i32,
    pub new_quantity: i32,
    pub min_stock_level: i32,
}

impl StockChange {
    pub fn is_low(&self) -> bool {
        self.new_quantity <= self.min_stock_level
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LowStockItem {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub min_stock_level: i32,
    pub shortfall: i32,
}

/// Inserts the stock row that every product owns.
pub(crate) async fn create_inventory_row<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
    min_stock_level: i32,
    max_stock_level: Option<i32>,
    location: Option<String>,
) -> Result<inventory::Model, ServiceError> {
    let now = Utc::now();
    Ok(inventory::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        quantity: Set(quantity),
        min_stock_level: Set(min_stock_level),
        max_stock_level: Set(max_stock_level),
        location: Set(location),
        last_restocked_at: Set(if quantity > 0 { Some(now) } else { None }),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

/// Applies a signed stock movement with a single conditional UPDATE so the
/// quantity can never drop below zero, even under concurrent writers.
pub(crate) async fn apply_stock_delta<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
    restocked: bool,
) -> Result<StockChange, ServiceError> {
    let removed = delta
        .checked_neg()
        .ok_or_else(|| ServiceError::ValidationError("Quantity change is out of range".to_string()))?;
    let now = Utc::now();
    let mut update = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::Quantity,
            Expr::col(inventory::Column::Quantity).add(delta),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(now))
        .filter(inventory::Column::ProductId.eq(product_id));
    if delta < 0 {
        update = update.filter(inventory::Column::Quantity.gte(removed));
    } else {
        update = update.filter(inventory::Column::Quantity.lte(i32::MAX - delta));
    }
    if restocked {
        update = update.col_expr(inventory::Column::LastRestockedAt, Expr::value(Some(now)));
    }
    let result = update.exec(conn).await?;

    let row = inventory::Entity::find()
        .filter(inventory::Column::ProductId.eq(product_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("No inventory record for product {}", product_id)))?;

    if result.rows_affected == 0 {
        if delta > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Stock for product {} cannot exceed {}",
                product_id,
                i32::MAX
            )));
        }
        return Err(ServiceError::InsufficientStock {
            product_id,
            requested: removed,
            available: row.quantity,
        });
    }

    Ok(StockChange {
        product_id,
        old_quantity: row.quantity - delta,
        new_quantity: row.quantity,
        min_stock_level: row.min_stock_level,
    })
}

/// Publishes adjustment and low-stock events once the movement is committed.
pub(crate) async fn publish_stock_changes(
    event_sender: &EventSender,
    changes: &[StockChange],
    reason: &str,
) {
    for change in changes {
        event_sender
            .send_or_log(Event::StockAdjusted {
                product_id: change.product_id,
                old_quantity: change.old_quantity,
                new_quantity: change.new_quantity,
                reason: reason.to_string(),
            })
            .await;
        if change.is_low() {
            event_sender
                .send_or_log(Event::LowStock {
                    product_id: change.product_id,
                    quantity: change.new_quantity,
                    min_stock_level: change.min_stock_level,
                })
                .await;
        }
    }
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_by_product(&self, product_id: Uuid) -> Result<inventory::Model, ServiceError> {
        inventory::Entity::find()
            .filter(inventory::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No inventory record for product {}", product_id))
            })
    }

    #[instrument(skip(self))]
    pub async fn list_inventory(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<inventory::Model>, u64), ServiceError> {
        let query = inventory::Entity::find();
        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let rows = query
            .order_by_asc(inventory::Column::Quantity)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((rows, total))
    }

    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        input: AdjustStockInput,
    ) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let change = apply_stock_delta(&*self.db, product_id, input.quantity_change, false).await?;
        publish_stock_changes(&self.event_sender, &[change], &input.reason).await;
        info!(%product_id, delta = input.quantity_change, reason = %input.reason, "Adjusted stock");
        self.get_by_product(product_id).await
    }

    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        product_id: Uuid,
        input: SetStockInput,
    ) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;
        let current = inventory::Entity::find()
            .filter(inventory::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No inventory record for product {}", product_id))
            })?;
        let delta = input.quantity - current.quantity;
        let change = if delta == 0 {
            None
        } else {
            Some(apply_stock_delta(&txn, product_id, delta, delta > 0).await?)
        };
        txn.commit().await?;

        if let Some(change) = change {
            let reason = input.reason.unwrap_or_else(|| "stock count".to_string());
            publish_stock_changes(&self.event_sender, &[change], &reason).await;
        }
        self.get_by_product(product_id).await
    }

    #[instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: Uuid,
        input: RestockInput,
    ) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let change = apply_stock_delta(&*self.db, product_id, input.quantity, true).await?;
        let row = self.get_by_product(product_id).await?;
        if let Some(max) = row.max_stock_level {
            if row.quantity > max {
                warn!(%product_id, quantity = row.quantity, max, "Restock exceeds maximum stock level");
            }
        }
        publish_stock_changes(&self.event_sender, &[change], "restock").await;
        info!(%product_id, quantity = input.quantity, "Restocked product");
        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn update_levels(
        &self,
        product_id: Uuid,
        input: UpdateLevelsInput,
    ) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let current = self.get_by_product(product_id).await?;

        let min = input.min_stock_level.unwrap_or(current.min_stock_level);
        let max = input.max_stock_level.or(current.max_stock_level);
        if let Some(max) = max {
            if max < min {
                return Err(ServiceError::ValidationError(format!(
                    "max_stock_level {} is below min_stock_level {}",
                    max, min
                )));
            }
        }

        let mut active: inventory::ActiveModel = current.into();
        active.min_stock_level = Set(min);
        active.max_stock_level = Set(max);
        if let Some(location) = input.location {
            let location = location.trim().to_string();
            active.location = Set((!location.is_empty()).then_some(location));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Active products at or below their minimum stock level, worst first.
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<LowStockItem>, ServiceError> {
        let rows = inventory::Entity::find()
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let mut items: Vec<LowStockItem> = rows
            .into_iter()
            .filter(|(stock, _)| stock.is_low_stock())
            .filter_map(|(stock, product)| {
                let product = product.filter(|p| p.is_active)?;
                Some(LowStockItem {
                    product_id: product.id,
                    sku: product.sku,
                    name: product.name,
                    quantity: stock.quantity,
                    min_stock_level: stock.min_stock_level,
                    shortfall: stock.min_stock_level - stock.quantity,
                })
            })
            .collect();
        items.sort_by(|a, b| b.shortfall.cmp(&a.shortfall).then(a.sku.cmp(&b.sku)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_adjustment_is_invalid() {
        let input = AdjustStockInput {
            quantity_change: 0,
            reason: "count".into(),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn stock_change_flags_low_stock_at_threshold() {
        let change = StockChange {
            product_id: Uuid::nil(),
            old_quantity: 6,
            new_quantity: 5,
            min_stock_level: 5,
        };
        assert!(change.is_low());
    }
}
