use crate::{
    errors::ServiceError,
    models::{product, purchase_order, PurchaseOrderStatus},
    models::supplier,
    services::{normalize_optional, page_window},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateSupplierInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplierInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub contact_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SupplierRemoval {
    Deleted,
    Deactivated,
}

#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DatabaseConnection>,
}

impl SupplierService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_supplier(
        &self,
        input: CreateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let supplier = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            contact_name: Set(normalize_optional(input.contact_name)),
            email: Set(normalize_optional(input.email).map(|e| e.to_lowercase())),
            phone: Set(normalize_optional(input.phone)),
            address: Set(normalize_optional(input.address)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(supplier_id = %supplier.id, "Created supplier");
        Ok(supplier)
    }

    #[instrument(skip(self))]
    pub async fn get_supplier(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", id))
    }

    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        include_inactive: bool,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<supplier::Model>, u64), ServiceError> {
        let mut query = supplier::Entity::find();
        if !include_inactive {
            query = query.filter(supplier::Column::IsActive.eq(true));
        }
        let total = query.clone().count(&*self.db).await?;
        let (limit, offset) = page_window(page, per_page);
        let suppliers = query
            .order_by_asc(supplier::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok((suppliers, total))
    }

    #[instrument(skip(self))]
    pub async fn update_supplier(
        &self,
        id: Uuid,
        input: UpdateSupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let mut active: supplier::ActiveModel = self.get_supplier(id).await?.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.contact_name.is_some() {
            active.contact_name = Set(normalize_optional(input.contact_name));
        }
        if input.email.is_some() {
            active.email = Set(normalize_optional(input.email).map(|e| e.to_lowercase()));
        }
        if input.phone.is_some() {
            active.phone = Set(normalize_optional(input.phone));
        }
        if input.address.is_some() {
            active.address = Set(normalize_optional(input.address));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Suppliers with open purchase orders stay. Suppliers with any history
    /// are deactivated; the rest are removed.
    #[instrument(skip(self))]
    pub async fn delete_supplier(&self, id: Uuid) -> Result<SupplierRemoval, ServiceError> {
        let supplier = self.get_supplier(id).await?;

        let orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::SupplierId.eq(id))
            .all(&*self.db)
            .await?;
        let open = orders.iter().filter(|o| o.status.is_open()).count();
        if open > 0 {
            warn!(supplier_id = %id, open, "Supplier has open purchase orders");
            return Err(ServiceError::BusinessLogic(format!(
                "Supplier {} has {} open purchase order(s)",
                supplier.name, open
            )));
        }

        let products = product::Entity::find()
            .filter(product::Column::SupplierId.eq(id))
            .count(&*self.db)
            .await?;

        if orders.is_empty() && products == 0 {
            supplier.delete(&*self.db).await?;
            info!(supplier_id = %id, "Deleted supplier");
            return Ok(SupplierRemoval::Deleted);
        }

        let mut active: supplier::ActiveModel = supplier.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(supplier_id = %id, "Deactivated supplier with history");
        Ok(SupplierRemoval::Deactivated)
    }

    /// Purchase orders placed with this supplier, newest first.
    #[instrument(skip(self))]
    pub async fn supplier_orders(
        &self,
        id: Uuid,
        status: Option<PurchaseOrderStatus>,
    ) -> Result<Vec<purchase_order::Model>, ServiceError> {
        self.get_supplier(id).await?;
        let mut query =
            purchase_order::Entity::find().filter(purchase_order::Column::SupplierId.eq(id));
        if let Some(status) = status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
