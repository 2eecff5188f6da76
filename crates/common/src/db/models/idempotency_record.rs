//! Idempotency key record

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome marker of a claimed key
pub mod outcome {
    pub const IN_FLIGHT: &str = "in_flight";
    pub const COMPLETED: &str = "completed";
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idempotency_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub scope: String,

    /// sha256(scope, caller key), hex encoded
    #[sea_orm(column_type = "Text", unique)]
    pub key_hash: String,

    #[sea_orm(column_type = "Text")]
    pub outcome: String,

    pub created_at: DateTimeWithTimeZone,

    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
