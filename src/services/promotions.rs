use crate::{
    errors::ServiceError,
    models::{customer, product, promotion, CustomerType, PromotionType},
    services::{normalize_optional, round_money},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One order line as seen by the discount calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountLine {
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct DiscountContext {
    pub customer_type: Option<CustomerType>,
    pub lines: Vec<DiscountLine>,
    pub order_subtotal: Decimal,
    pub now: DateTime<Utc>,
}

impl DiscountContext {
    pub fn new(customer_type: Option<CustomerType>, lines: Vec<DiscountLine>) -> Self {
        let order_subtotal = lines.iter().map(|l| l.line_total).sum();
        Self {
            customer_type,
            lines,
            order_subtotal,
            now: Utc::now(),
        }
    }
}

/// Why a promotion does not apply to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Ineligible {
    #[error("promotion is not active")]
    Inactive,
    #[error("promotion has not started yet")]
    NotStarted,
    #[error("promotion has expired")]
    Expired,
    #[error("promotion usage limit has been reached")]
    UsageLimitReached,
    #[error("promotion is restricted to another customer type")]
    CustomerTypeMismatch,
    #[error("no items in the order qualify for the promotion")]
    NoEligibleItems,
    #[error("order total is below the promotion minimum")]
    BelowMinimumOrder,
}

/// Discount a promotion grants on an order, or the first rule it fails.
pub fn calculate_discount(
    promotion: &promotion::Model,
    ctx: &DiscountContext,
) -> Result<Decimal, Ineligible> {
    if !promotion.is_active {
        return Err(Ineligible::Inactive);
    }
    if ctx.now < promotion.start_date {
        return Err(Ineligible::NotStarted);
    }
    if ctx.now > promotion.end_date {
        return Err(Ineligible::Expired);
    }
    if let Some(limit) = promotion.usage_limit {
        if promotion.usage_count >= limit {
            return Err(Ineligible::UsageLimitReached);
        }
    }
    if let Some(required) = promotion.customer_type {
        if ctx.customer_type != Some(required) {
            return Err(Ineligible::CustomerTypeMismatch);
        }
    }

    let product_ids = promotion.product_id_list();
    let category_ids = promotion.category_id_list();
    let unrestricted = product_ids.is_empty() && category_ids.is_empty();
    let eligible: Vec<&DiscountLine> = ctx
        .lines
        .iter()
        .filter(|line| {
            unrestricted
                || product_ids.contains(&line.product_id)
                || line
                    .category_id
                    .map_or(false, |c| category_ids.contains(&c))
        })
        .collect();
    if eligible.is_empty() {
        return Err(Ineligible::NoEligibleItems);
    }

    if let Some(min) = promotion.min_order_amount {
        if ctx.order_subtotal < min {
            return Err(Ineligible::BelowMinimumOrder);
        }
    }

    let eligible_subtotal: Decimal = eligible.iter().map(|l| l.line_total).sum();
    let mut discount = match promotion.promotion_type {
        PromotionType::Percentage => {
            eligible_subtotal * promotion.discount_value / Decimal::ONE_HUNDRED
        }
        PromotionType::FixedAmount => promotion.discount_value,
    };
    if let Some(cap) = promotion.max_discount_amount {
        discount = discount.min(cap);
    }
    Ok(round_money(discount.min(eligible_subtotal).max(Decimal::ZERO)))
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePromotionInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 2, max = 50))]
    pub code: String,
    pub promotion_type: PromotionType,
    pub discount_value: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub customer_type: Option<CustomerType>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePromotionInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub discount_value: Option<Decimal>,
    /// `null` removes the cap; an absent field keeps it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub max_discount_amount: Option<Option<Decimal>>,
    /// `null` removes the minimum; an absent field keeps it
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub min_order_amount: Option<Option<Decimal>>,
    /// `null` opens the promotion to every customer type
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<CustomerType>, nullable)]
    pub customer_type: Option<Option<CustomerType>>,
    /// Replaces the targeted categories; an empty list targets none
    pub category_ids: Option<Vec<Uuid>>,
    /// Replaces the targeted products; an empty list targets none
    pub product_ids: Option<Vec<Uuid>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// `null` removes the limit
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<i32>, nullable)]
    pub usage_limit: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EvaluateItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct EvaluatePromotionInput {
    pub code: String,
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub items: Vec<EvaluateItem>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PromotionEvaluation {
    pub promotion_id: Uuid,
    pub code: String,
    pub eligible: bool,
    pub order_subtotal: Decimal,
    pub discount_amount: Decimal,
    pub reason: Option<Ineligible>,
}

fn validate_rules(
    promotion_type: PromotionType,
    discount_value: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    max_discount_amount: Option<Decimal>,
    min_order_amount: Option<Decimal>,
) -> Result<(), ServiceError> {
    match promotion_type {
        PromotionType::Percentage => {
            if discount_value <= Decimal::ZERO || discount_value > Decimal::ONE_HUNDRED {
                return Err(ServiceError::ValidationError(
                    "percentage discount must be greater than 0 and at most 100".into(),
                ));
            }
        }
        PromotionType::FixedAmount => {
            if discount_value <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "fixed discount must be greater than 0".into(),
                ));
            }
        }
    }
    if end_date <= start_date {
        return Err(ServiceError::ValidationError(
            "end_date must be after start_date".into(),
        ));
    }
    if max_discount_amount.map_or(false, |v| v <= Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "max_discount_amount must be greater than 0".into(),
        ));
    }
    if min_order_amount.map_or(false, |v| v < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "min_order_amount must not be negative".into(),
        ));
    }
    Ok(())
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn id_list(ids: &[Uuid]) -> serde_json::Value {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    )
}

/// Claims one use of a promotion, failing when its limit is exhausted.
pub(crate) async fn claim_usage<C: ConnectionTrait>(
    conn: &C,
    promotion: &promotion::Model,
) -> Result<(), ServiceError> {
    let result = promotion::Entity::update_many()
        .col_expr(
            promotion::Column::UsageCount,
            Expr::col(promotion::Column::UsageCount).add(1),
        )
        .col_expr(promotion::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(promotion::Column::Id.eq(promotion.id))
        .filter(
            Condition::any()
                .add(promotion::Column::UsageLimit.is_null())
                .add(
                    Expr::col(promotion::Column::UsageCount)
                        .lt(Expr::col(promotion::Column::UsageLimit)),
                ),
        )
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::BusinessLogic(format!(
            "Promotion {}: {}",
            promotion.code,
            Ineligible::UsageLimitReached
        )));
    }
    Ok(())
}

/// Gives back a use claimed by a sale that was later cancelled.
pub(crate) async fn release_usage<C: ConnectionTrait>(
    conn: &C,
    promotion_id: Uuid,
) -> Result<(), ServiceError> {
    promotion::Entity::update_many()
        .col_expr(
            promotion::Column::UsageCount,
            Expr::col(promotion::Column::UsageCount).sub(1),
        )
        .col_expr(promotion::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(promotion::Column::Id.eq(promotion_id))
        .filter(promotion::Column::UsageCount.gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

pub(crate) async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<promotion::Model, ServiceError> {
    let code = normalize_code(code);
    promotion::Entity::find()
        .filter(promotion::Column::Code.eq(code.as_str()))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Promotion with code {} not found", code)))
}

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_promotion(
        &self,
        input: CreatePromotionInput,
    ) -> Result<promotion::Model, ServiceError> {
        input.validate()?;
        validate_rules(
            input.promotion_type,
            input.discount_value,
            input.start_date,
            input.end_date,
            input.max_discount_amount,
            input.min_order_amount,
        )?;

        let code = normalize_code(&input.code);
        let taken = promotion::Entity::find()
            .filter(promotion::Column::Code.eq(code.as_str()))
            .one(&*self.db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::DataIntegrity(format!(
                "Promotion code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(normalize_optional(input.description)),
            code: Set(code),
            promotion_type: Set(input.promotion_type),
            discount_value: Set(input.discount_value),
            max_discount_amount: Set(input.max_discount_amount.map(round_money)),
            min_order_amount: Set(input.min_order_amount.map(round_money)),
            customer_type: Set(input.customer_type),
            category_ids: Set(id_list(&input.category_ids)),
            product_ids: Set(id_list(&input.product_ids)),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(promotion_id = %model.id, code = %model.code, "Created promotion");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get_promotion(&self, id: Uuid) -> Result<promotion::Model, ServiceError> {
        promotion::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Promotion", id))
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<promotion::Model, ServiceError> {
        find_by_code(&*self.db, code).await
    }

    /// With `active_only`, only promotions that are switched on and inside
    /// their date window are listed.
    #[instrument(skip(self))]
    pub async fn list_promotions(
        &self,
        active_only: bool,
    ) -> Result<Vec<promotion::Model>, ServiceError> {
        let mut query = promotion::Entity::find();
        if active_only {
            let now = Utc::now();
            query = query
                .filter(promotion::Column::IsActive.eq(true))
                .filter(promotion::Column::StartDate.lte(now))
                .filter(promotion::Column::EndDate.gte(now));
        }
        Ok(query
            .order_by_desc(promotion::Column::StartDate)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_promotion(
        &self,
        id: Uuid,
        input: UpdatePromotionInput,
    ) -> Result<promotion::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_promotion(id).await?;

        let discount_value = input.discount_value.unwrap_or(existing.discount_value);
        let start_date = input.start_date.unwrap_or(existing.start_date);
        let end_date = input.end_date.unwrap_or(existing.end_date);
        let max_discount_amount = input
            .max_discount_amount
            .unwrap_or(existing.max_discount_amount);
        let min_order_amount = input.min_order_amount.unwrap_or(existing.min_order_amount);
        validate_rules(
            existing.promotion_type,
            discount_value,
            start_date,
            end_date,
            max_discount_amount,
            min_order_amount,
        )?;
        if let Some(Some(limit)) = input.usage_limit {
            if limit < 1 {
                return Err(ServiceError::ValidationError(
                    "usage_limit must be at least 1".into(),
                ));
            }
            if limit < existing.usage_count {
                return Err(ServiceError::BusinessLogic(format!(
                    "usage_limit {} is below the {} uses already recorded",
                    limit, existing.usage_count
                )));
            }
        }

        let mut active: promotion::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(normalize_optional(input.description));
        }
        active.discount_value = Set(discount_value);
        active.start_date = Set(start_date);
        active.end_date = Set(end_date);
        active.max_discount_amount = Set(max_discount_amount.map(round_money));
        active.min_order_amount = Set(min_order_amount.map(round_money));
        if let Some(usage_limit) = input.usage_limit {
            active.usage_limit = Set(usage_limit);
        }
        if let Some(customer_type) = input.customer_type {
            active.customer_type = Set(customer_type);
        }
        if let Some(category_ids) = &input.category_ids {
            active.category_ids = Set(id_list(category_ids));
        }
        if let Some(product_ids) = &input.product_ids {
            active.product_ids = Set(id_list(product_ids));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let model = active.update(&*self.db).await?;
        info!(promotion_id = %id, "Updated promotion");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn deactivate_promotion(&self, id: Uuid) -> Result<promotion::Model, ServiceError> {
        let existing = self.get_promotion(id).await?;
        let mut active: promotion::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let model = active.update(&*self.db).await?;
        info!(promotion_id = %id, "Deactivated promotion");
        Ok(model)
    }

    /// Previews the discount a code would give on a basket without
    /// touching stock or usage counters.
    #[instrument(skip(self, input))]
    pub async fn evaluate(
        &self,
        input: EvaluatePromotionInput,
    ) -> Result<PromotionEvaluation, ServiceError> {
        input.validate()?;
        for item in &input.items {
            item.validate()?;
        }
        let promotion = self.get_by_code(&input.code).await?;

        let customer_type = match input.customer_id {
            Some(customer_id) => Some(
                customer::Entity::find_by_id(customer_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Customer", customer_id))?
                    .customer_type,
            ),
            None => None,
        };

        let ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| ServiceError::not_found("Product", item.product_id))?;
            let unit_price = item.unit_price.unwrap_or(product.price);
            lines.push(DiscountLine {
                product_id: product.id,
                category_id: product.category_id,
                line_total: round_money(unit_price * Decimal::from(item.quantity)),
            });
        }

        let ctx = DiscountContext::new(customer_type, lines);
        let outcome = calculate_discount(&promotion, &ctx);
        debug!(code = %promotion.code, ?outcome, "Evaluated promotion");
        Ok(PromotionEvaluation {
            promotion_id: promotion.id,
            code: promotion.code,
            eligible: outcome.is_ok(),
            order_subtotal: ctx.order_subtotal,
            discount_amount: outcome.unwrap_or(Decimal::ZERO),
            reason: outcome.err(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn promo(kind: PromotionType, value: Decimal) -> promotion::Model {
        let now = Utc::now();
        promotion::Model {
            id: Uuid::new_v4(),
            name: "Spring".into(),
            description: None,
            code: "SPRING".into(),
            promotion_type: kind,
            discount_value: value,
            max_discount_amount: None,
            min_order_amount: None,
            customer_type: None,
            category_ids: serde_json::json!([]),
            product_ids: serde_json::json!([]),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(total: Decimal) -> DiscountLine {
        DiscountLine {
            product_id: Uuid::new_v4(),
            category_id: None,
            line_total: total,
        }
    }

    #[rstest]
    #[case(PromotionType::Percentage, dec!(10), dec!(100), dec!(10.00))]
    #[case(PromotionType::Percentage, dec!(15), dec!(33.33), dec!(5.00))]
    #[case(PromotionType::Percentage, dec!(100), dec!(42.50), dec!(42.50))]
    #[case(PromotionType::FixedAmount, dec!(20), dec!(100), dec!(20))]
    #[case(PromotionType::FixedAmount, dec!(50), dec!(30), dec!(30))]
    fn discount_amounts(
        #[case] kind: PromotionType,
        #[case] value: Decimal,
        #[case] subtotal: Decimal,
        #[case] expected: Decimal,
    ) {
        let ctx = DiscountContext::new(None, vec![line(subtotal)]);
        assert_eq!(calculate_discount(&promo(kind, value), &ctx), Ok(expected));
    }

    #[test]
    fn cap_applies_before_subtotal_limit() {
        let mut p = promo(PromotionType::Percentage, dec!(50));
        p.max_discount_amount = Some(dec!(25));
        let ctx = DiscountContext::new(None, vec![line(dec!(200))]);
        assert_eq!(calculate_discount(&p, &ctx), Ok(dec!(25)));
    }

    #[test]
    fn date_window_and_flags_are_checked() {
        let ctx = DiscountContext::new(None, vec![line(dec!(10))]);

        let mut p = promo(PromotionType::FixedAmount, dec!(1));
        p.is_active = false;
        assert_eq!(calculate_discount(&p, &ctx), Err(Ineligible::Inactive));

        let mut p = promo(PromotionType::FixedAmount, dec!(1));
        p.start_date = ctx.now + Duration::hours(1);
        p.end_date = ctx.now + Duration::days(2);
        assert_eq!(calculate_discount(&p, &ctx), Err(Ineligible::NotStarted));

        let mut p = promo(PromotionType::FixedAmount, dec!(1));
        p.end_date = ctx.now - Duration::hours(1);
        assert_eq!(calculate_discount(&p, &ctx), Err(Ineligible::Expired));

        let mut p = promo(PromotionType::FixedAmount, dec!(1));
        p.usage_limit = Some(3);
        p.usage_count = 3;
        assert_eq!(
            calculate_discount(&p, &ctx),
            Err(Ineligible::UsageLimitReached)
        );
    }

    #[test]
    fn customer_type_restriction() {
        let mut p = promo(PromotionType::Percentage, dec!(10));
        p.customer_type = Some(CustomerType::Vip);

        let anonymous = DiscountContext::new(None, vec![line(dec!(10))]);
        assert_eq!(
            calculate_discount(&p, &anonymous),
            Err(Ineligible::CustomerTypeMismatch)
        );
        let vip = DiscountContext::new(Some(CustomerType::Vip), vec![line(dec!(10))]);
        assert_eq!(calculate_discount(&p, &vip), Ok(dec!(1.00)));
    }

    #[test]
    fn whitelists_limit_the_discounted_lines() {
        let category = Uuid::new_v4();
        let mut p = promo(PromotionType::Percentage, dec!(10));
        p.category_ids = serde_json::json!([category.to_string()]);

        let mut matching = line(dec!(40));
        matching.category_id = Some(category);
        let ctx = DiscountContext::new(None, vec![matching, line(dec!(60))]);
        assert_eq!(calculate_discount(&p, &ctx), Ok(dec!(4.00)));

        let other = DiscountContext::new(None, vec![line(dec!(60))]);
        assert_eq!(
            calculate_discount(&p, &other),
            Err(Ineligible::NoEligibleItems)
        );
    }

    #[test]
    fn minimum_order_uses_whole_subtotal() {
        let mut p = promo(PromotionType::FixedAmount, dec!(5));
        p.min_order_amount = Some(dec!(50));
        let below = DiscountContext::new(None, vec![line(dec!(49.99))]);
        assert_eq!(
            calculate_discount(&p, &below),
            Err(Ineligible::BelowMinimumOrder)
        );
        let at = DiscountContext::new(None, vec![line(dec!(20)), line(dec!(30))]);
        assert_eq!(calculate_discount(&p, &at), Ok(dec!(5)));
    }

    #[test]
    fn rule_validation() {
        let now = Utc::now();
        let later = now + Duration::days(1);
        assert!(validate_rules(PromotionType::Percentage, dec!(0), now, later, None, None).is_err());
        assert!(validate_rules(PromotionType::Percentage, dec!(100.01), now, later, None, None).is_err());
        assert!(validate_rules(PromotionType::Percentage, dec!(100), now, later, None, None).is_ok());
        assert!(validate_rules(PromotionType::FixedAmount, dec!(-1), now, later, None, None).is_err());
        assert!(validate_rules(PromotionType::FixedAmount, dec!(5), later, now, None, None).is_err());
        assert_eq!(normalize_code(" spring24 "), "SPRING24");
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal(
            cents in 1i64..10_000_000,
            percent in 1u32..=100,
            fixed_cents in 1i64..10_000_000,
        ) {
            let subtotal = Decimal::new(cents, 2);
            let ctx = DiscountContext::new(None, vec![line(subtotal)]);

            let pct = calculate_discount(&promo(PromotionType::Percentage, Decimal::from(percent)), &ctx).unwrap();
            prop_assert!(pct >= Decimal::ZERO && pct <= subtotal);

            let fixed = calculate_discount(&promo(PromotionType::FixedAmount, Decimal::new(fixed_cents, 2)), &ctx).unwrap();
            prop_assert!(fixed >= Decimal::ZERO && fixed <= subtotal);
        }
    }
}
