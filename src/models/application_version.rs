use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An uploaded build of the desktop client.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "application_versions")]
#[schema(as = ApplicationVersion)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub version: String,
    pub file_name: String,
    /// Location relative to the update storage directory, always `/`-separated
    pub file_path: String,
    pub file_size: i64,
    /// Hex SHA-256 of the stored file
    pub checksum: String,
    pub release_notes: Option<String>,
    pub is_mandatory: bool,
    pub min_supported_version: Option<String>,
    pub is_active: bool,
    pub download_count: i64,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::update_download::Entity")]
    Downloads,
}

impl Related<super::update_download::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Downloads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
