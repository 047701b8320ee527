use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted limiter state for one (client, endpoint) pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_limit_trackers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub client_id: String,
    pub endpoint: String,
    pub request_count: i32,
    pub previous_count: i32,
    pub window_start: DateTime<Utc>,
    pub violation_count: i32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub last_request_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
