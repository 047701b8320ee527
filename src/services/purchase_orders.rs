use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{product, purchase_order, purchase_order_item, supplier, PurchaseOrderStatus},
    services::{
        document_number,
        inventory::{apply_stock_delta, publish_stock_changes},
        normalize_optional, page_window, round_money,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PurchaseOrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Uuid,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<PurchaseOrderItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    pub order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

fn ensure_transition(
    order: &purchase_order::Model,
    allowed: &[PurchaseOrderStatus],
    action: &str,
) -> Result<(), ServiceError> {
    if allowed.contains(&order.status) {
        Ok(())
    } else {
        Err(ServiceError::BusinessLogic(format!(
            "Cannot {} purchase order {} in status {:?}",
            action, order.order_number, order.status
        )))
    }
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create_purchase_order(
        &self,
        input: CreatePurchaseOrderInput,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        input.validate()?;
        for item in &input.items {
            item.validate()?;
            if item.unit_cost.is_sign_negative() && !item.unit_cost.is_zero() {
                return Err(ServiceError::ValidationError(
                    "unit_cost must not be negative".into(),
                ));
            }
        }

        let supplier = supplier::Entity::find_by_id(input.supplier_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", input.supplier_id))?;
        if !supplier.is_active {
            return Err(ServiceError::BusinessLogic(format!(
                "Supplier {} is inactive",
                supplier.name
            )));
        }

        let wanted: HashSet<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        let found: HashSet<Uuid> = product::Entity::find()
            .filter(product::Column::Id.is_in(wanted.iter().copied()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(ServiceError::not_found("Product", *missing));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let lines: Vec<(PurchaseOrderItemInput, Decimal)> = input
            .items
            .into_iter()
            .map(|item| {
                let total = round_money(item.unit_cost * Decimal::from(item.quantity));
                (item, total)
            })
            .collect();
        let total_amount = round_money(lines.iter().map(|(_, t)| *t).sum());

        let txn = self.db.begin().await?;
        let order = purchase_order::ActiveModel {
            id: Set(order_id),
            order_number: Set(document_number("PO")),
            supplier_id: Set(supplier.id),
            status: Set(PurchaseOrderStatus::Pending),
            expected_delivery_date: Set(input.expected_delivery_date),
            received_at: Set(None),
            total_amount: Set(total_amount),
            notes: Set(normalize_optional(input.notes)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (item, line_total) in lines {
            let saved = purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_cost: Set(round_money(item.unit_cost)),
                line_total: Set(line_total),
                received_quantity: Set(0),
            }
            .insert(&txn)
            .await?;
            items.push(saved);
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PurchaseOrderCreated(order.id))
            .await;
        info!(order_id = %order.id, number = %order.order_number, "Created purchase order");
        Ok(PurchaseOrderDetail { order, items })
    }

    #[instrument(skip(self))]
    pub async fn get_purchase_order(&self, id: Uuid) -> Result<PurchaseOrderDetail, ServiceError> {
        let order = self.find_order(id).await?;
        let items = order
            .find_related(purchase_order_item::Entity)
            .all(&*self.db)
            .await?;
        Ok(PurchaseOrderDetail { order, items })
    }

    #[instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        filter: PurchaseOrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let mut query = purchase_order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(purchase_order::Column::SupplierId.eq(supplier_id));
        }
        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let orders = query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((orders, total))
    }

    #[instrument(skip(self))]
    pub async fn approve_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let order = self.find_order(id).await?;
        ensure_transition(&order, &[PurchaseOrderStatus::Pending], "approve")?;
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Approved);
        active.updated_at = Set(Utc::now());
        let order = active.update(&*self.db).await?;
        info!(order_id = %id, "Approved purchase order");
        Ok(order)
    }

    /// Books every ordered unit into stock and closes the order.
    #[instrument(skip(self))]
    pub async fn receive_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let order = self.find_order(id).await?;
        ensure_transition(&order, &[PurchaseOrderStatus::Approved], "receive")?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let lines = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
            .all(&txn)
            .await?;

        let mut changes = Vec::with_capacity(lines.len());
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            changes.push(apply_stock_delta(&txn, line.product_id, line.quantity, true).await?);
            let quantity = line.quantity;
            let mut active: purchase_order_item::ActiveModel = line.into();
            active.received_quantity = Set(quantity);
            items.push(active.update(&txn).await?);
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Received);
        active.received_at = Set(Some(now));
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;
        txn.commit().await?;

        publish_stock_changes(&self.event_sender, &changes, "purchase order received").await;
        self.event_sender
            .send_or_log(Event::PurchaseOrderReceived(id))
            .await;
        info!(order_id = %id, lines = items.len(), "Received purchase order");
        Ok(PurchaseOrderDetail { order, items })
    }

    #[instrument(skip(self))]
    pub async fn cancel_purchase_order(
        &self,
        id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let order = self.find_order(id).await?;
        ensure_transition(
            &order,
            &[PurchaseOrderStatus::Pending, PurchaseOrderStatus::Approved],
            "cancel",
        )?;
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let order = active.update(&*self.db).await?;
        info!(order_id = %id, "Cancelled purchase order");
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        purchase_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase order", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn order(status: PurchaseOrderStatus) -> purchase_order::Model {
        let now = Utc::now();
        purchase_order::Model {
            id: Uuid::new_v4(),
            order_number: "PO-20240101-ABCDEF12".into(),
            supplier_id: Uuid::new_v4(),
            status,
            expected_delivery_date: None,
            received_at: None,
            total_amount: dec!(10),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_listed_transitions_pass() {
        let received = order(PurchaseOrderStatus::Received);
        assert_matches!(
            ensure_transition(&received, &[PurchaseOrderStatus::Pending, PurchaseOrderStatus::Approved], "cancel"),
            Err(ServiceError::BusinessLogic(_))
        );
        let pending = order(PurchaseOrderStatus::Pending);
        assert!(ensure_transition(&pending, &[PurchaseOrderStatus::Pending], "approve").is_ok());
    }

    #[test]
    fn empty_orders_fail_validation() {
        let input = CreatePurchaseOrderInput {
            supplier_id: Uuid::new_v4(),
            expected_delivery_date: None,
            notes: None,
            items: vec![],
        };
        assert!(input.validate().is_err());
    }
}
