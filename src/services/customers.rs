use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        customer::{self, CustomerType},
        sale, sales_return,
    },
    services::{normalize_optional, page_window, round_money},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub customer_type: Option<CustomerType>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    pub search: Option<String>,
    pub customer_type: Option<CustomerType>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// What `delete_customer` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Deactivated,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerHistory {
    pub customer: customer::Model,
    pub sales: Vec<sale::Model>,
    pub returns: Vec<sales_return::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerStats {
    pub customer_id: Uuid,
    pub completed_sales: u64,
    pub total_spent: Decimal,
    pub total_refunded: Decimal,
    pub average_order_value: Decimal,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_customer(
        &self,
        input: CreateCustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let email = normalize_email(&input.email);
        self.ensure_unique_email(&email, None).await?;

        let now = Utc::now();
        let customer = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            phone: Set(normalize_optional(input.phone)),
            address: Set(normalize_optional(input.address)),
            customer_type: Set(input.customer_type.unwrap_or(CustomerType::Regular)),
            total_purchases: Set(Decimal::ZERO),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CustomerCreated(customer.id))
            .await;
        info!(customer_id = %customer.id, "Created customer");
        Ok(customer)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        filter: CustomerFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let mut query = customer::Entity::find();

        if !filter.include_inactive {
            query = query.filter(customer::Column::IsActive.eq(true));
        }
        if let Some(customer_type) = filter.customer_type {
            query = query.filter(customer::Column::CustomerType.eq(customer_type));
        }
        if let Some(search) = normalize_optional(filter.search) {
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(&search))
                    .add(customer::Column::Email.contains(search.to_lowercase())),
            );
        }

        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let customers = query
            .order_by_asc(customer::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;

        Ok((customers, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_customer(
        &self,
        id: Uuid,
        input: UpdateCustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_customer(id).await?;
        let mut active: customer::ActiveModel = existing.into();

        if let Some(email) = input.email {
            let email = normalize_email(&email);
            self.ensure_unique_email(&email, Some(id)).await?;
            active.email = Set(email);
        }
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.phone.is_some() {
            active.phone = Set(normalize_optional(input.phone));
        }
        if input.address.is_some() {
            active.address = Set(normalize_optional(input.address));
        }
        if let Some(customer_type) = input.customer_type {
            active.customer_type = Set(customer_type);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let customer = active.update(&*self.db).await?;
        info!(customer_id = %id, "Updated customer");
        Ok(customer)
    }

    /// Removes a customer. Customers referenced by sales or returns are only
    /// deactivated, and only when `force` is set.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: Uuid, force: bool) -> Result<DeleteOutcome, ServiceError> {
        let customer = self.get_customer(id).await?;

        let sales = sale::Entity::find()
            .filter(sale::Column::CustomerId.eq(id))
            .count(&*self.db)
            .await?;
        let returns = sales_return::Entity::find()
            .filter(sales_return::Column::CustomerId.eq(id))
            .count(&*self.db)
            .await?;

        if sales == 0 && returns == 0 {
            customer.delete(&*self.db).await?;
            info!(customer_id = %id, "Deleted customer");
            return Ok(DeleteOutcome::Deleted);
        }

        if !force {
            warn!(customer_id = %id, sales, returns, "Refusing to delete referenced customer");
            return Err(ServiceError::BusinessLogic(format!(
                "Customer {} has {} sale(s) and {} return(s); use force to deactivate instead",
                id, sales, returns
            )));
        }

        let mut active: customer::ActiveModel = customer.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CustomerDeactivated(id))
            .await;
        info!(customer_id = %id, "Force-deleted customer by deactivation");
        Ok(DeleteOutcome::Deactivated)
    }

    #[instrument(skip(self))]
    pub async fn get_customer_history(&self, id: Uuid) -> Result<CustomerHistory, ServiceError> {
        let customer = self.get_customer(id).await?;
        let sales = sale::Entity::find()
            .filter(sale::Column::CustomerId.eq(id))
            .order_by_desc(sale::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let returns = sales_return::Entity::find()
            .filter(sales_return::Column::CustomerId.eq(id))
            .order_by_desc(sales_return::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(CustomerHistory {
            customer,
            sales,
            returns,
        })
    }

    #[instrument(skip(self))]
    pub async fn customer_stats(&self, id: Uuid) -> Result<CustomerStats, ServiceError> {
        let history = self.get_customer_history(id).await?;

        let realized: Vec<&sale::Model> = history
            .sales
            .iter()
            .filter(|s| s.status.is_realized())
            .collect();
        let total_spent: Decimal = realized.iter().map(|s| s.total_amount).sum();
        let total_refunded: Decimal = history
            .returns
            .iter()
            .filter(|r| r.status == crate::models::ReturnStatus::Completed)
            .map(|r| r.total_refund)
            .sum();
        let completed_sales = realized.len() as u64;
        let average_order_value = if completed_sales == 0 {
            Decimal::ZERO
        } else {
            round_money(total_spent / Decimal::from(completed_sales))
        };

        Ok(CustomerStats {
            customer_id: id,
            completed_sales,
            total_spent: round_money(total_spent),
            total_refunded: round_money(total_refunded),
            average_order_value,
            last_purchase_at: realized.iter().filter_map(|s| s.completed_at).max(),
        })
    }

    async fn ensure_unique_email(&self, email: &str, exclude: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = customer::Entity::find().filter(
            Expr::expr(Func::lower(Expr::col(customer::Column::Email))).eq(email.to_string()),
        );
        if let Some(id) = exclude {
            query = query.filter(customer::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::DataIntegrity(format!(
                "A customer with email {} already exists",
                email
            )));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Moves a customer's lifetime purchase total by `delta` inside the caller's
/// connection or transaction.
pub(crate) async fn adjust_total_purchases<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    delta: Decimal,
) -> Result<(), ServiceError> {
    let Some(customer) = customer::Entity::find_by_id(customer_id).one(conn).await? else {
        return Ok(());
    };
    let updated = round_money((customer.total_purchases + delta).max(Decimal::ZERO));
    let mut active: customer::ActiveModel = customer.into();
    active.total_purchases = Set(updated);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ann@Shop.COM "), "ann@shop.com");
    }

    #[test]
    fn create_input_rejects_bad_email() {
        let input = CreateCustomerInput {
            name: "Ann".into(),
            email: "not-an-email".into(),
            phone: None,
            address: None,
            customer_type: None,
        };
        assert!(input.validate().is_err());
    }
}
