//! Append-only audit log entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// CREATE, UPDATE, DELETE, LOGIN or LOGOUT
    #[sea_orm(column_type = "Text")]
    pub action: String,

    #[sea_orm(column_type = "Text")]
    pub entity: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub entity_id: Option<String>,

    /// Serialized JSON payload
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,

    // Principal snapshot at the time of the action
    pub user_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_email: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_name: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
