//! Audit trail recorder
//!
//! Best-effort, append-only record of who changed what. A failure to write
//! an entry is logged and counted, never returned to the operation being
//! described.

use crate::auth::{require_privileged, RequestContext};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry as handed to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

/// Append-only destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<()>;
}

/// Filters for the admin audit listing
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub entity: Option<String>,
    pub action: Option<AuditAction>,
    pub user_id: Option<Uuid>,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 50 }

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            entity: None,
            action: None,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditLog>,
    pub total: u64,
    pub pages: u64,
    pub current_page: u64,
}

/// SeaORM-backed audit log
pub struct AuditLogStore {
    pool: DbPool,
}

impl AuditLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Newest-first listing, admins only
    pub async fn list(&self, ctx: &RequestContext, query: AuditQuery) -> Result<AuditPage> {
        require_privileged(ctx)?;

        let mut filter = Condition::all();
        if let Some(entity) = query.entity {
            filter = filter.add(AuditLogColumn::Entity.eq(entity));
        }
        if let Some(action) = query.action {
            filter = filter.add(AuditLogColumn::Action.eq(action.as_str()));
        }
        if let Some(user_id) = query.user_id {
            filter = filter.add(AuditLogColumn::UserId.eq(user_id));
        }

        let page = query.page.max(1);
        let paginator = AuditLogEntity::find()
            .filter(filter)
            .order_by_desc(AuditLogColumn::CreatedAt)
            .order_by_desc(AuditLogColumn::Id)
            .paginate(self.pool.read(), query.per_page.clamp(1, 200));

        let counts = paginator.num_items_and_pages().await?;
        let entries = paginator.fetch_page(page - 1).await?;

        Ok(AuditPage {
            entries,
            total: counts.number_of_items,
            pages: counts.number_of_pages,
            current_page: page,
        })
    }
}

#[async_trait]
impl AuditSink for AuditLogStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<()> {
        AuditLogActiveModel {
            // Time-ordered ids keep same-instant entries in insertion order
            id: Set(Uuid::now_v7()),
            action: Set(entry.action.as_str().to_string()),
            entity: Set(entry.entity),
            entity_id: Set(entry.entity_id),
            details: Set(entry.details),
            user_id: Set(entry.user_id),
            user_email: Set(entry.user_email),
            user_name: Set(entry.user_name),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(self.pool.write())
        .await?;
        Ok(())
    }
}

/// Best-effort recorder used by every mutating path
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an action. Never fails.
    pub async fn log_activity(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        entity: &str,
        entity_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        let principal = ctx.principal.as_ref();
        let entry = NewAuditEntry {
            action,
            entity: entity.to_string(),
            entity_id: entity_id.map(str::to_string),
            details: details.map(|d| d.to_string()),
            user_id: principal.map(|p| p.id),
            user_email: principal.map(|p| p.email.clone()),
            user_name: principal.and_then(|p| p.name.clone()),
        };

        if let Err(e) = self.sink.append(entry).await {
            error!(
                error = %e,
                action = action.as_str(),
                entity,
                entity_id = ?entity_id,
                request_id = %ctx.request_id,
                "Audit log failed"
            );
            metrics::record_audit_failure(entity);
        }
    }
}
