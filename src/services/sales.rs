use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        applied_promotion, customer, product, promotion, sale, sale_item, sales_return,
        ReturnStatus, SaleStatus,
    },
    services::{
        customers::adjust_total_purchases,
        document_number,
        inventory::{apply_stock_delta, publish_stock_changes},
        normalize_optional, page_window,
        promotions::{calculate_discount, claim_usage, find_by_code, release_usage, DiscountContext, DiscountLine},
        round_money,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SaleItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Overrides the catalog price for this line
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSaleInput {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub items: Vec<SaleItemInput>,
    #[serde(default)]
    pub promotion_codes: Vec<String>,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub customer_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleDetail {
    pub sale: sale::Model,
    pub items: Vec<sale_item::Model>,
    pub promotions: Vec<applied_promotion::Model>,
}

/// Collapses repeated lines for the same product at the same price.
fn merge_lines(items: Vec<SaleItemInput>) -> Result<Vec<SaleItemInput>, ServiceError> {
    let mut merged: Vec<SaleItemInput> = Vec::with_capacity(items.len());
    for item in items {
        match merged
            .iter_mut()
            .find(|m| m.product_id == item.product_id && m.unit_price == item.unit_price)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(item.quantity).ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Combined quantity for product {} is out of range",
                        item.product_id
                    ))
                })?;
            }
            None => merged.push(item),
        }
    }
    Ok(merged)
}

/// Splits `discount` over lines in proportion to their gross amounts using
/// largest remainders, so the cent shares always sum to `discount`.
pub fn apportion_discount(discount: Decimal, line_totals: &[Decimal]) -> Vec<Decimal> {
    let subtotal: Decimal = line_totals.iter().copied().sum();
    if discount.is_zero() || subtotal.is_zero() {
        return vec![Decimal::ZERO; line_totals.len()];
    }
    let cent = Decimal::new(1, 2);
    let exact: Vec<Decimal> = line_totals
        .iter()
        .map(|total| discount * *total / subtotal)
        .collect();
    let mut shares: Vec<Decimal> = exact
        .iter()
        .map(|e| e.round_dp_with_strategy(2, RoundingStrategy::ToZero))
        .collect();

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| (exact[b] - shares[b]).cmp(&(exact[a] - shares[a])));
    let mut leftover = discount - shares.iter().copied().sum::<Decimal>();
    for index in order {
        if leftover < cent {
            break;
        }
        shares[index] += cent;
        leftover -= cent;
    }
    shares
}

fn ensure_status(sale: &sale::Model, allowed: &[SaleStatus], action: &str) -> Result<(), ServiceError> {
    if allowed.contains(&sale.status) {
        return Ok(());
    }
    let message = match sale.status {
        SaleStatus::Completed if action == "complete" => {
            format!("Sale {} is already completed", sale.sale_number)
        }
        status => format!(
            "Cannot {} sale {} in status {:?}",
            action, sale.sale_number, status
        ),
    };
    Err(ServiceError::BusinessLogic(message))
}

#[derive(Clone)]
pub struct SalesService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
}

impl SalesService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>, tax_rate: Decimal) -> Self {
        Self {
            db,
            event_sender,
            tax_rate,
        }
    }

    /// Prices, discounts and books a sale. Stock, promotion usage and all
    /// sale rows are written in a single transaction.
    #[instrument(skip(self, input), fields(customer_id = ?input.customer_id))]
    pub async fn create_sale(&self, input: CreateSaleInput) -> Result<SaleDetail, ServiceError> {
        input.validate()?;
        for item in &input.items {
            item.validate()?;
            if item.unit_price.map_or(false, |p| p < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(
                    "unit_price must not be negative".into(),
                ));
            }
        }
        let lines = merge_lines(input.items)?;

        let txn = self.db.begin().await?;

        let customer_type = match input.customer_id {
            Some(customer_id) => {
                let customer = customer::Entity::find_by_id(customer_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?;
                if !customer.is_active {
                    return Err(ServiceError::BusinessLogic(format!(
                        "Customer {} is inactive",
                        customer.email
                    )));
                }
                Some(customer.customer_type)
            }
            None => None,
        };

        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(lines.iter().map(|l| l.product_id)))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            if !product.is_active {
                return Err(ServiceError::BusinessLogic(format!(
                    "Product {} is not available for sale",
                    product.sku
                )));
            }
            let unit_price = round_money(line.unit_price.unwrap_or(product.price));
            let gross = round_money(unit_price * Decimal::from(line.quantity));
            priced.push((line, product, unit_price, gross));
        }

        let mut stock_changes = Vec::with_capacity(priced.len());
        for (line, _, _, _) in &priced {
            stock_changes.push(apply_stock_delta(&txn, line.product_id, -line.quantity, false).await?);
        }

        let ctx = DiscountContext::new(
            customer_type,
            priced
                .iter()
                .map(|(line, product, _, gross)| DiscountLine {
                    product_id: line.product_id,
                    category_id: product.category_id,
                    line_total: *gross,
                })
                .collect(),
        );
        let subtotal = ctx.order_subtotal;

        let mut codes: Vec<String> = input
            .promotion_codes
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        let mut seen = HashSet::new();
        codes.retain(|c| seen.insert(c.clone()));

        let mut applied: Vec<(promotion::Model, Decimal)> = Vec::with_capacity(codes.len());
        let mut discount_total = Decimal::ZERO;
        for code in &codes {
            let promotion = find_by_code(&txn, code).await?;
            let amount = calculate_discount(&promotion, &ctx).map_err(|reason| {
                ServiceError::BusinessLogic(format!("Promotion {}: {}", promotion.code, reason))
            })?;
            let amount = amount.min(subtotal - discount_total);
            discount_total += amount;
            applied.push((promotion, amount));
        }

        let shares = apportion_discount(
            discount_total,
            &priced.iter().map(|(_, _, _, gross)| *gross).collect::<Vec<_>>(),
        );
        let taxable = subtotal - discount_total;
        let tax_amount = round_money(taxable * self.tax_rate);
        let total_amount = round_money(taxable + tax_amount);

        let now = Utc::now();
        let sale_id = Uuid::new_v4();
        let sale = sale::ActiveModel {
            id: Set(sale_id),
            sale_number: Set(document_number("SAL")),
            customer_id: Set(input.customer_id),
            status: Set(SaleStatus::Pending),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_total),
            tax_amount: Set(tax_amount),
            total_amount: Set(total_amount),
            payment_method: Set(normalize_optional(input.payment_method)),
            notes: Set(normalize_optional(input.notes)),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for ((line, _, unit_price, gross), share) in priced.iter().zip(shares) {
            let item = sale_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(*unit_price),
                discount_amount: Set(share),
                line_total: Set(*gross - share),
                returned_quantity: Set(0),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let mut promotions = Vec::with_capacity(applied.len());
        for (promotion, amount) in &applied {
            claim_usage(&txn, promotion).await?;
            let row = applied_promotion::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                promotion_id: Set(promotion.id),
                promotion_code: Set(promotion.code.clone()),
                discount_amount: Set(*amount),
                applied_at: Set(now),
            }
            .insert(&txn)
            .await?;
            promotions.push(row);
        }

        txn.commit().await?;

        counter!("sales_api_sales_created_total", 1);
        publish_stock_changes(&self.event_sender, &stock_changes, "sale").await;
        for row in &promotions {
            self.event_sender
                .send_or_log(Event::PromotionApplied {
                    promotion_id: row.promotion_id,
                    sale_id,
                    discount_amount: row.discount_amount,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::SaleCreated {
                sale_id,
                total_amount,
            })
            .await;
        info!(%sale_id, number = %sale.sale_number, %total_amount, "Created sale");

        Ok(SaleDetail {
            sale,
            items,
            promotions,
        })
    }

    #[instrument(skip(self))]
    pub async fn complete_sale(&self, id: Uuid) -> Result<sale::Model, ServiceError> {
        let existing = self.find_sale(id).await?;
        ensure_status(&existing, &[SaleStatus::Pending], "complete")?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let customer_id = existing.customer_id;
        let total = existing.total_amount;
        let mut active: sale::ActiveModel = existing.into();
        active.status = Set(SaleStatus::Completed);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        let sale = active.update(&txn).await?;
        if let Some(customer_id) = customer_id {
            adjust_total_purchases(&txn, customer_id, total).await?;
        }
        txn.commit().await?;

        counter!("sales_api_sales_completed_total", 1);
        self.event_sender.send_or_log(Event::SaleCompleted(id)).await;
        info!(sale_id = %id, "Completed sale");
        Ok(sale)
    }

    /// Reverses a sale that has no returns: stock goes back, the customer
    /// total is reverted for completed sales and promotion uses are released.
    #[instrument(skip(self))]
    pub async fn cancel_sale(&self, id: Uuid) -> Result<sale::Model, ServiceError> {
        let existing = self.find_sale(id).await?;
        ensure_status(&existing, &[SaleStatus::Pending, SaleStatus::Completed], "cancel")?;

        let returns = sales_return::Entity::find()
            .filter(sales_return::Column::SaleId.eq(id))
            .filter(sales_return::Column::Status.ne(ReturnStatus::Rejected))
            .count(&*self.db)
            .await?;
        if returns > 0 {
            return Err(ServiceError::BusinessLogic(format!(
                "Sale {} has returns and cannot be cancelled",
                existing.sale_number
            )));
        }

        let txn = self.db.begin().await?;
        let items = sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(id))
            .all(&txn)
            .await?;
        let mut changes = Vec::with_capacity(items.len());
        for item in &items {
            changes.push(apply_stock_delta(&txn, item.product_id, item.quantity, false).await?);
        }

        let applied = applied_promotion::Entity::find()
            .filter(applied_promotion::Column::SaleId.eq(id))
            .all(&txn)
            .await?;
        for row in &applied {
            release_usage(&txn, row.promotion_id).await?;
        }

        if existing.status == SaleStatus::Completed {
            if let Some(customer_id) = existing.customer_id {
                adjust_total_purchases(&txn, customer_id, -existing.total_amount).await?;
            }
        }

        let mut active: sale::ActiveModel = existing.into();
        active.status = Set(SaleStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let sale = active.update(&txn).await?;
        txn.commit().await?;

        publish_stock_changes(&self.event_sender, &changes, "sale cancelled").await;
        self.event_sender.send_or_log(Event::SaleCancelled(id)).await;
        info!(sale_id = %id, "Cancelled sale");
        Ok(sale)
    }

    #[instrument(skip(self))]
    pub async fn get_sale(&self, id: Uuid) -> Result<SaleDetail, ServiceError> {
        let sale = self.find_sale(id).await?;
        let items = sale.find_related(sale_item::Entity).all(&*self.db).await?;
        let promotions = sale
            .find_related(applied_promotion::Entity)
            .all(&*self.db)
            .await?;
        Ok(SaleDetail {
            sale,
            items,
            promotions,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        filter: SaleFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sale::Model>, u64), ServiceError> {
        let mut query = sale::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(sale::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(sale::Column::CustomerId.eq(customer_id));
        }
        if let Some(from) = filter.from {
            query = query.filter(sale::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(sale::Column::CreatedAt.lte(to));
        }
        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let sales = query
            .order_by_desc(sale::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((sales, total))
    }

    async fn find_sale(&self, id: Uuid) -> Result<sale::Model, ServiceError> {
        sale::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn repeated_lines_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(vec![
            SaleItemInput { product_id: a, quantity: 1, unit_price: None },
            SaleItemInput { product_id: b, quantity: 2, unit_price: None },
            SaleItemInput { product_id: a, quantity: 3, unit_price: None },
            SaleItemInput { product_id: a, quantity: 1, unit_price: Some(dec!(1)) },
        ])
        .unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].quantity, 4);
        assert_eq!(merged[2].unit_price, Some(dec!(1)));
    }

    #[test]
    fn merged_quantity_overflow_is_a_validation_error() {
        let a = Uuid::new_v4();
        let result = merge_lines(vec![
            SaleItemInput { product_id: a, quantity: i32::MAX, unit_price: None },
            SaleItemInput { product_id: a, quantity: 2, unit_price: None },
        ]);
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn discount_is_split_by_line_weight() {
        let shares = apportion_discount(dec!(10), &[dec!(60), dec!(30), dec!(10)]);
        assert_eq!(shares, vec![dec!(6.00), dec!(3.00), dec!(1.00)]);
    }

    #[test]
    fn leftover_cents_go_to_largest_remainders() {
        let shares = apportion_discount(dec!(10), &[dec!(1), dec!(1), dec!(1)]);
        assert_eq!(shares, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);

        let shares = apportion_discount(dec!(1), &[dec!(2), dec!(1)]);
        assert_eq!(shares, vec![dec!(0.67), dec!(0.33)]);
    }

    #[test]
    fn no_discount_means_zero_shares() {
        assert_eq!(
            apportion_discount(Decimal::ZERO, &[dec!(5), dec!(7)]),
            vec![Decimal::ZERO, Decimal::ZERO]
        );
    }

    proptest! {
        #[test]
        fn shares_sum_to_discount(
            totals in proptest::collection::vec(1i64..1_000_000, 1..8),
            ratio in 0u32..=100,
        ) {
            let totals: Vec<Decimal> = totals.into_iter().map(|c| Decimal::new(c, 2)).collect();
            let subtotal: Decimal = totals.iter().copied().sum();
            let discount = round_money(subtotal * Decimal::from(ratio) / Decimal::ONE_HUNDRED);
            let shares = apportion_discount(discount, &totals);
            prop_assert_eq!(shares.iter().copied().sum::<Decimal>(), discount);
            prop_assert!(shares.iter().all(|s| *s >= Decimal::ZERO));
        }
    }
}
