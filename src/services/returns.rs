use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{return_item, sale, sale_item, sales_return, ReturnStatus, SaleStatus},
    services::{
        customers::adjust_total_purchases,
        document_number,
        inventory::{apply_stock_delta, publish_stock_changes},
        normalize_optional, page_window, round_money,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

fn default_restock() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReturnItemInput {
    pub sale_item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[serde(default = "default_restock")]
    pub restock: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReturnInput {
    pub sale_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(min = 1))]
    pub items: Vec<ReturnItemInput>,
    pub refund_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RejectReturnInput {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
    pub sale_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnDetail {
    #[serde(rename = "return")]
    pub sales_return: sales_return::Model,
    pub items: Vec<return_item::Model>,
}

/// Refund for `quantity` units of a sold line, at the line's net unit price.
pub fn refund_for(item: &sale_item::Model, quantity: i32) -> Decimal {
    if item.quantity == 0 {
        return Decimal::ZERO;
    }
    round_money(item.line_total / Decimal::from(item.quantity) * Decimal::from(quantity))
}

/// Sale status once every line's returned quantity is known.
fn status_after_return(items: &[sale_item::Model]) -> SaleStatus {
    if items.iter().all(|i| i.returned_quantity >= i.quantity) {
        SaleStatus::Returned
    } else {
        SaleStatus::PartiallyReturned
    }
}

fn ensure_status(
    ret: &sales_return::Model,
    expected: ReturnStatus,
    action: &str,
) -> Result<(), ServiceError> {
    if ret.status == expected {
        Ok(())
    } else {
        Err(ServiceError::BusinessLogic(format!(
            "Cannot {} return {} in status {:?}",
            action, ret.return_number, ret.status
        )))
    }
}

#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReturnService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens a return against a completed sale. Units already returned or
    /// held by other open returns cannot be claimed again.
    #[instrument(skip(self, input), fields(sale_id = %input.sale_id))]
    pub async fn create_return(&self, input: CreateReturnInput) -> Result<ReturnDetail, ServiceError> {
        input.validate()?;
        for item in &input.items {
            item.validate()?;
        }

        let sale = sale::Entity::find_by_id(input.sale_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", input.sale_id))?;
        if !sale.status.accepts_returns() {
            return Err(ServiceError::BusinessLogic(format!(
                "Sale {} in status {:?} does not accept returns",
                sale.sale_number, sale.status
            )));
        }

        let sold: HashMap<Uuid, sale_item::Model> = sale
            .find_related(sale_item::Entity)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let open_returns: Vec<Uuid> = sales_return::Entity::find()
            .filter(sales_return::Column::SaleId.eq(sale.id))
            .filter(sales_return::Column::Status.is_in([ReturnStatus::Pending, ReturnStatus::Approved]))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let mut held: HashMap<Uuid, i32> = HashMap::new();
        if !open_returns.is_empty() {
            for item in return_item::Entity::find()
                .filter(return_item::Column::ReturnId.is_in(open_returns))
                .all(&*self.db)
                .await?
            {
                *held.entry(item.sale_item_id).or_default() += item.quantity;
            }
        }

        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        for item in &input.items {
            if !sold.contains_key(&item.sale_item_id) {
                return Err(ServiceError::BusinessLogic(format!(
                    "Sale item {} does not belong to sale {}",
                    item.sale_item_id, sale.sale_number
                )));
            }
            *requested.entry(item.sale_item_id).or_default() += item.quantity;
        }
        for (sale_item_id, quantity) in &requested {
            let line = &sold[sale_item_id];
            let available = line.returnable_quantity() - held.get(sale_item_id).copied().unwrap_or(0);
            if *quantity > available {
                return Err(ServiceError::BusinessLogic(format!(
                    "Cannot return {} units of sale item {}; {} remain returnable",
                    quantity,
                    sale_item_id,
                    available.max(0)
                )));
            }
        }

        let now = Utc::now();
        let return_id = Uuid::new_v4();
        let lines: Vec<(ReturnItemInput, Decimal)> = input
            .items
            .into_iter()
            .map(|item| {
                let refund = refund_for(&sold[&item.sale_item_id], item.quantity);
                (item, refund)
            })
            .collect();
        let total_refund = round_money(lines.iter().map(|(_, r)| *r).sum());

        let txn = self.db.begin().await?;
        let sales_return = sales_return::ActiveModel {
            id: Set(return_id),
            return_number: Set(document_number("RET")),
            sale_id: Set(sale.id),
            customer_id: Set(sale.customer_id),
            status: Set(ReturnStatus::Pending),
            reason: Set(input.reason.trim().to_string()),
            total_refund: Set(total_refund),
            refund_method: Set(normalize_optional(input.refund_method)),
            rejection_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            refunded_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (item, refund) in lines {
            let row = return_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(return_id),
                sale_item_id: Set(item.sale_item_id),
                product_id: Set(sold[&item.sale_item_id].product_id),
                quantity: Set(item.quantity),
                refund_amount: Set(refund),
                restock: Set(item.restock),
            }
            .insert(&txn)
            .await?;
            items.push(row);
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnCreated(return_id))
            .await;
        info!(%return_id, number = %sales_return.return_number, %total_refund, "Created return");
        Ok(ReturnDetail {
            sales_return,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn approve_return(&self, id: Uuid) -> Result<sales_return::Model, ServiceError> {
        let existing = self.find_return(id).await?;
        ensure_status(&existing, ReturnStatus::Pending, "approve")?;
        let mut active: sales_return::ActiveModel = existing.into();
        active.status = Set(ReturnStatus::Approved);
        active.updated_at = Set(Utc::now());
        let ret = active.update(&*self.db).await?;
        info!(return_id = %id, "Approved return");
        Ok(ret)
    }

    #[instrument(skip(self, input))]
    pub async fn reject_return(
        &self,
        id: Uuid,
        input: RejectReturnInput,
    ) -> Result<sales_return::Model, ServiceError> {
        input.validate()?;
        let existing = self.find_return(id).await?;
        ensure_status(&existing, ReturnStatus::Pending, "reject")?;
        let mut active: sales_return::ActiveModel = existing.into();
        active.status = Set(ReturnStatus::Rejected);
        active.rejection_reason = Set(Some(input.reason.trim().to_string()));
        active.updated_at = Set(Utc::now());
        let ret = active.update(&*self.db).await?;
        info!(return_id = %id, "Rejected return");
        Ok(ret)
    }

    /// Settles an approved return: restocks flagged goods, records the
    /// returned units on the sale and reduces the customer's total.
    #[instrument(skip(self))]
    pub async fn complete_return(&self, id: Uuid) -> Result<ReturnDetail, ServiceError> {
        let existing = self.find_return(id).await?;
        ensure_status(&existing, ReturnStatus::Approved, "complete")?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let items = return_item::Entity::find()
            .filter(return_item::Column::ReturnId.eq(id))
            .all(&txn)
            .await?;

        let mut changes = Vec::new();
        for item in &items {
            let line = sale_item::Entity::find_by_id(item.sale_item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Sale item", item.sale_item_id))?;
            let returned = line.returned_quantity + item.quantity;
            if returned > line.quantity {
                return Err(ServiceError::DataIntegrity(format!(
                    "Sale item {} would have {} of {} units returned",
                    line.id, returned, line.quantity
                )));
            }
            let mut active: sale_item::ActiveModel = line.into();
            active.returned_quantity = Set(returned);
            active.update(&txn).await?;

            if item.restock {
                changes.push(apply_stock_delta(&txn, item.product_id, item.quantity, false).await?);
            }
        }

        let sale = sale::Entity::find_by_id(existing.sale_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", existing.sale_id))?;
        let sale_lines = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(sale.id))
            .all(&txn)
            .await?;
        let customer_id = sale.customer_id;
        let mut sale_active: sale::ActiveModel = sale.into();
        sale_active.status = Set(status_after_return(&sale_lines));
        sale_active.updated_at = Set(now);
        sale_active.update(&txn).await?;

        if let Some(customer_id) = customer_id {
            adjust_total_purchases(&txn, customer_id, -existing.total_refund).await?;
        }

        let refund_amount = existing.total_refund;
        let mut active: sales_return::ActiveModel = existing.into();
        active.status = Set(ReturnStatus::Completed);
        active.refunded_at = Set(Some(now));
        active.updated_at = Set(now);
        let sales_return = active.update(&txn).await?;
        txn.commit().await?;

        counter!("sales_api_returns_completed_total", 1);
        publish_stock_changes(&self.event_sender, &changes, "return").await;
        self.event_sender
            .send_or_log(Event::ReturnCompleted {
                return_id: id,
                refund_amount,
            })
            .await;
        info!(return_id = %id, %refund_amount, "Completed return");
        Ok(ReturnDetail {
            sales_return,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, id: Uuid) -> Result<ReturnDetail, ServiceError> {
        let sales_return = self.find_return(id).await?;
        let items = sales_return
            .find_related(return_item::Entity)
            .all(&*self.db)
            .await?;
        Ok(ReturnDetail {
            sales_return,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        filter: ReturnFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sales_return::Model>, u64), ServiceError> {
        let mut query = sales_return::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(sales_return::Column::Status.eq(status));
        }
        if let Some(sale_id) = filter.sale_id {
            query = query.filter(sales_return::Column::SaleId.eq(sale_id));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(sales_return::Column::CustomerId.eq(customer_id));
        }
        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let returns = query
            .order_by_desc(sales_return::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((returns, total))
    }

    async fn find_return(&self, id: Uuid) -> Result<sales_return::Model, ServiceError> {
        sales_return::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, returned: i32, line_total: Decimal) -> sale_item::Model {
        sale_item::Model {
            id: Uuid::new_v4(),
            sale_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
            unit_price: dec!(10),
            discount_amount: Decimal::ZERO,
            line_total,
            returned_quantity: returned,
        }
    }

    #[test]
    fn refunds_use_net_unit_price() {
        assert_eq!(refund_for(&line(3, 0, dec!(27)), 2), dec!(18.00));
        assert_eq!(refund_for(&line(3, 0, dec!(10)), 1), dec!(3.33));
        assert_eq!(refund_for(&line(3, 0, dec!(10)), 3), dec!(10.00));
    }

    #[test]
    fn sale_is_returned_only_when_every_unit_is_back() {
        let partial = vec![line(2, 2, dec!(20)), line(1, 0, dec!(5))];
        assert_eq!(status_after_return(&partial), SaleStatus::PartiallyReturned);
        let full = vec![line(2, 2, dec!(20)), line(1, 1, dec!(5))];
        assert_eq!(status_after_return(&full), SaleStatus::Returned);
    }

    #[test]
    fn restock_defaults_to_true() {
        let item: ReturnItemInput = serde_json::from_value(serde_json::json!({
            "sale_item_id": Uuid::nil(),
            "quantity": 1
        }))
        .unwrap();
        assert!(item.restock);
    }
}
