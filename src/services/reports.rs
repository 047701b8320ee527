//! Read-only reporting. Rows are fetched for the requested period and
//! aggregated in memory.

use crate::{
    errors::ServiceError,
    models::{
        applied_promotion, category, customer, inventory, product, promotion, sale, sale_item,
        sales_return, ReturnStatus, SaleStatus,
    },
    services::round_money,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Select};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const REALIZED: [SaleStatus; 3] = [
    SaleStatus::Completed,
    SaleStatus::PartiallyReturned,
    SaleStatus::Returned,
];

/// Inclusive reporting period; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams, ToSchema)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    fn apply<E, C>(&self, mut query: Select<E>, column: C) -> Select<E>
    where
        E: EntityTrait,
        C: ColumnTrait + Copy,
    {
        if let Some(from) = self.from {
            query = query.filter(column.gte(from));
        }
        if let Some(to) = self.to {
            query = query.filter(column.lte(to));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SalesSummary {
    pub sales_count: u64,
    pub gross_sales: Decimal,
    pub total_discounts: Decimal,
    pub total_tax: Decimal,
    pub net_sales: Decimal,
    pub average_order_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub sales_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategorySales {
    pub category_id: Option<Uuid>,
    pub category_name: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
    pub share_percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CustomerSales {
    pub customer_id: Uuid,
    pub name: String,
    pub email: String,
    pub sales_count: u64,
    pub total_spent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValuationLine {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InventoryValuation {
    pub items: Vec<ValuationLine>,
    pub total_units: i64,
    pub total_value: Decimal,
    pub low_stock_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReturnsSummary {
    pub return_count: u64,
    pub completed_returns: u64,
    pub pending_returns: u64,
    pub total_refunded: Decimal,
    /// Share of realized sales with at least one completed return
    pub return_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PromotionPerformance {
    pub promotion_id: Uuid,
    pub code: String,
    pub name: String,
    pub times_used: u64,
    pub total_discount: Decimal,
}

fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        round_money(part * Decimal::ONE_HUNDRED / whole)
    }
}

/// Totals over realized sales.
pub fn summarize(sales: &[sale::Model]) -> SalesSummary {
    let mut summary = SalesSummary {
        sales_count: 0,
        gross_sales: Decimal::ZERO,
        total_discounts: Decimal::ZERO,
        total_tax: Decimal::ZERO,
        net_sales: Decimal::ZERO,
        average_order_value: Decimal::ZERO,
    };
    for sale in sales.iter().filter(|s| s.status.is_realized()) {
        summary.sales_count += 1;
        summary.gross_sales += sale.subtotal;
        summary.total_discounts += sale.discount_amount;
        summary.total_tax += sale.tax_amount;
        summary.net_sales += sale.total_amount;
    }
    if summary.sales_count > 0 {
        summary.average_order_value =
            round_money(summary.net_sales / Decimal::from(summary.sales_count));
    }
    summary
}

/// Per-day counts and revenue, oldest day first.
pub fn group_by_day(sales: &[sale::Model]) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, (u64, Decimal)> = BTreeMap::new();
    for sale in sales.iter().filter(|s| s.status.is_realized()) {
        let entry = days
            .entry(sale.created_at.date_naive())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += sale.total_amount;
    }
    days.into_iter()
        .map(|(date, (sales_count, revenue))| DailySales {
            date,
            sales_count,
            revenue,
        })
        .collect()
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn realized_sales(&self, range: &DateRange) -> Result<Vec<sale::Model>, ServiceError> {
        let query = sale::Entity::find().filter(sale::Column::Status.is_in(REALIZED));
        Ok(range
            .apply(query, sale::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn realized_items(&self, range: &DateRange) -> Result<Vec<sale_item::Model>, ServiceError> {
        let ids: Vec<Uuid> = self.realized_sales(range).await?.iter().map(|s| s.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.is_in(ids))
            .all(&*self.db)
            .await?)
    }

    async fn products_by_id(&self, ids: HashSet<Uuid>) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn sales_summary(&self, range: DateRange) -> Result<SalesSummary, ServiceError> {
        let sales = self.realized_sales(&range).await?;
        let summary = summarize(&sales);
        debug!(count = summary.sales_count, "Built sales summary");
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn daily_sales(&self, range: DateRange) -> Result<Vec<DailySales>, ServiceError> {
        Ok(group_by_day(&self.realized_sales(&range).await?))
    }

    #[instrument(skip(self))]
    pub async fn top_products(
        &self,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<ProductSales>, ServiceError> {
        let items = self.realized_items(&range).await?;
        let mut totals: HashMap<Uuid, (i64, Decimal)> = HashMap::new();
        for item in &items {
            let entry = totals.entry(item.product_id).or_insert((0, Decimal::ZERO));
            entry.0 += i64::from(item.quantity);
            entry.1 += item.line_total;
        }
        let products = self.products_by_id(totals.keys().copied().collect()).await?;

        let mut rows: Vec<ProductSales> = totals
            .into_iter()
            .map(|(product_id, (quantity_sold, revenue))| {
                let (sku, name) = products
                    .get(&product_id)
                    .map(|p| (p.sku.clone(), p.name.clone()))
                    .unwrap_or_default();
                ProductSales {
                    product_id,
                    sku,
                    name,
                    quantity_sold,
                    revenue,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.quantity_sold
                .cmp(&a.quantity_sold)
                .then(b.revenue.cmp(&a.revenue))
                .then(a.sku.cmp(&b.sku))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn sales_by_category(&self, range: DateRange) -> Result<Vec<CategorySales>, ServiceError> {
        let items = self.realized_items(&range).await?;
        let products = self
            .products_by_id(items.iter().map(|i| i.product_id).collect())
            .await?;
        let categories: HashMap<Uuid, String> = category::Entity::find()
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut totals: HashMap<Option<Uuid>, (i64, Decimal)> = HashMap::new();
        for item in &items {
            let category_id = products.get(&item.product_id).and_then(|p| p.category_id);
            let entry = totals.entry(category_id).or_insert((0, Decimal::ZERO));
            entry.0 += i64::from(item.quantity);
            entry.1 += item.line_total;
        }
        let grand_total: Decimal = totals.values().map(|(_, r)| *r).sum();

        let mut rows: Vec<CategorySales> = totals
            .into_iter()
            .map(|(category_id, (quantity_sold, revenue))| CategorySales {
                category_id,
                category_name: category_id
                    .and_then(|id| categories.get(&id).cloned())
                    .unwrap_or_else(|| "Uncategorized".to_string()),
                quantity_sold,
                revenue,
                share_percentage: percentage(revenue, grand_total),
            })
            .collect();
        rows.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.category_name.cmp(&b.category_name)));
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn top_customers(
        &self,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<CustomerSales>, ServiceError> {
        let sales = self.realized_sales(&range).await?;
        let mut totals: HashMap<Uuid, (u64, Decimal)> = HashMap::new();
        for sale in &sales {
            if let Some(customer_id) = sale.customer_id {
                let entry = totals.entry(customer_id).or_insert((0, Decimal::ZERO));
                entry.0 += 1;
                entry.1 += sale.total_amount;
            }
        }
        if totals.is_empty() {
            return Ok(Vec::new());
        }
        let customers: HashMap<Uuid, customer::Model> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(totals.keys().copied()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut rows: Vec<CustomerSales> = totals
            .into_iter()
            .filter_map(|(customer_id, (sales_count, total_spent))| {
                let customer = customers.get(&customer_id)?;
                Some(CustomerSales {
                    customer_id,
                    name: customer.name.clone(),
                    email: customer.email.clone(),
                    sales_count,
                    total_spent,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.total_spent.cmp(&a.total_spent).then(a.email.cmp(&b.email)));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Stock on hand valued at cost for every active product.
    #[instrument(skip(self))]
    pub async fn inventory_valuation(&self) -> Result<InventoryValuation, ServiceError> {
        let rows = inventory::Entity::find()
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let mut valuation = InventoryValuation {
            items: Vec::with_capacity(rows.len()),
            total_units: 0,
            total_value: Decimal::ZERO,
            low_stock_count: 0,
        };
        for (stock, product) in rows {
            let Some(product) = product.filter(|p| p.is_active) else {
                continue;
            };
            if stock.is_low_stock() {
                valuation.low_stock_count += 1;
            }
            let value = round_money(product.cost_price * Decimal::from(stock.quantity));
            valuation.total_units += i64::from(stock.quantity);
            valuation.total_value += value;
            valuation.items.push(ValuationLine {
                product_id: product.id,
                sku: product.sku,
                name: product.name,
                quantity: stock.quantity,
                unit_cost: product.cost_price,
                value,
            });
        }
        valuation
            .items
            .sort_by(|a, b| b.value.cmp(&a.value).then(a.sku.cmp(&b.sku)));
        Ok(valuation)
    }

    #[instrument(skip(self))]
    pub async fn returns_summary(&self, range: DateRange) -> Result<ReturnsSummary, ServiceError> {
        let returns = range
            .apply(sales_return::Entity::find(), sales_return::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let realized = self.realized_sales(&range).await?.len();

        let completed: Vec<&sales_return::Model> = returns
            .iter()
            .filter(|r| r.status == ReturnStatus::Completed)
            .collect();
        let sales_with_returns: HashSet<Uuid> = completed.iter().map(|r| r.sale_id).collect();

        Ok(ReturnsSummary {
            return_count: returns.len() as u64,
            completed_returns: completed.len() as u64,
            pending_returns: returns.iter().filter(|r| r.status.is_open()).count() as u64,
            total_refunded: completed.iter().map(|r| r.total_refund).sum(),
            return_rate: percentage(
                Decimal::from(sales_with_returns.len() as u64),
                Decimal::from(realized as u64),
            ),
        })
    }

    #[instrument(skip(self))]
    pub async fn promotion_performance(
        &self,
        range: DateRange,
    ) -> Result<Vec<PromotionPerformance>, ServiceError> {
        let applications = range
            .apply(applied_promotion::Entity::find(), applied_promotion::Column::AppliedAt)
            .all(&*self.db)
            .await?;
        let realized: HashSet<Uuid> = self
            .realized_sales(&DateRange::default())
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut totals: HashMap<Uuid, (u64, Decimal)> = HashMap::new();
        for application in applications.iter().filter(|a| realized.contains(&a.sale_id)) {
            let entry = totals
                .entry(application.promotion_id)
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += application.discount_amount;
        }

        let mut rows: Vec<PromotionPerformance> = promotion::Entity::find()
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| {
                let (times_used, total_discount) =
                    totals.get(&p.id).copied().unwrap_or((0, Decimal::ZERO));
                PromotionPerformance {
                    promotion_id: p.id,
                    code: p.code,
                    name: p.name,
                    times_used,
                    total_discount,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_discount
                .cmp(&a.total_discount)
                .then(a.code.cmp(&b.code))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sale_on(day: u32, status: SaleStatus, subtotal: Decimal, discount: Decimal) -> sale::Model {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        let tax = round_money((subtotal - discount) * dec!(0.1));
        sale::Model {
            id: Uuid::new_v4(),
            sale_number: format!("SAL-{}", day),
            customer_id: None,
            status,
            subtotal,
            discount_amount: discount,
            tax_amount: tax,
            total_amount: subtotal - discount + tax,
            payment_method: None,
            notes: None,
            created_at: at,
            updated_at: at,
            completed_at: Some(at),
        }
    }

    #[test]
    fn summary_ignores_unrealized_sales() {
        let sales = vec![
            sale_on(1, SaleStatus::Completed, dec!(100), dec!(10)),
            sale_on(1, SaleStatus::PartiallyReturned, dec!(50), dec!(0)),
            sale_on(2, SaleStatus::Cancelled, dec!(999), dec!(0)),
            sale_on(2, SaleStatus::Pending, dec!(999), dec!(0)),
        ];
        let summary = summarize(&sales);
        assert_eq!(summary.sales_count, 2);
        assert_eq!(summary.gross_sales, dec!(150));
        assert_eq!(summary.total_discounts, dec!(10));
        assert_eq!(summary.total_tax, dec!(14.00));
        assert_eq!(summary.net_sales, dec!(154.00));
        assert_eq!(summary.average_order_value, dec!(77.00));
    }

    #[test]
    fn empty_summary_has_zero_average() {
        assert_eq!(summarize(&[]).average_order_value, Decimal::ZERO);
    }

    #[test]
    fn days_are_ordered() {
        let sales = vec![
            sale_on(3, SaleStatus::Completed, dec!(10), dec!(0)),
            sale_on(1, SaleStatus::Completed, dec!(20), dec!(0)),
            sale_on(3, SaleStatus::Returned, dec!(30), dec!(0)),
        ];
        let days = group_by_day(&sales);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(days[1].sales_count, 2);
        assert_eq!(days[1].revenue, dec!(44.00));
    }

    #[test]
    fn percentage_handles_zero_whole() {
        assert_eq!(percentage(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percentage(dec!(1), dec!(3)), dec!(33.33));
    }
}
