//! Idempotency guard
//!
//! A caller-supplied key is claimed once per scope. While the claim is
//! alive (in flight or completed, until it expires) every further sighting
//! of the key is answered as a duplicate and the side effect is skipped.
//! A key seen again while its first call is still running is answered
//! immediately; nothing blocks.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Operation class a key is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyScope {
    Payment,
    InvoiceCreate,
    ContactSubmission,
}

impl IdempotencyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyScope::Payment => "payment",
            IdempotencyScope::InvoiceCreate => "invoice_create",
            IdempotencyScope::ContactSubmission => "contact_submission",
        }
    }
}

/// Fixed-width storage key for `(scope, key)`
pub fn key_hash(scope: IdempotencyScope, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_str().as_bytes());
    hasher.update(b"\x00");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistence for claimed keys
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record the first sighting of a key. `true` when this call owns it now.
    async fn claim(&self, key_hash: &str, scope: IdempotencyScope, ttl: Duration) -> Result<bool>;

    /// Mark the guarded operation as finished
    async fn complete(&self, key_hash: &str) -> Result<()>;

    /// Forget a key whose operation failed so it can be resubmitted
    async fn release(&self, key_hash: &str) -> Result<()>;

    /// Drop expired keys, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// SeaORM-backed store over `idempotency_records`
pub struct SeaIdempotencyStore {
    pool: DbPool,
}

impl SeaIdempotencyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for SeaIdempotencyStore {
    async fn claim(&self, key_hash: &str, scope: IdempotencyScope, ttl: Duration) -> Result<bool> {
        let db = self.pool.write();
        let now = Utc::now().fixed_offset();
        let expires_at = now
            + chrono::Duration::from_std(ttl).map_err(|e| AppError::Configuration {
                message: format!("Invalid idempotency ttl: {}", e),
            })?;

        let record = IdempotencyRecordActiveModel {
            id: Set(Uuid::new_v4()),
            scope: Set(scope.as_str().to_string()),
            key_hash: Set(key_hash.to_string()),
            outcome: Set(idempotency_outcome::IN_FLIGHT.to_string()),
            created_at: Set(now),
            expires_at: Set(expires_at),
        };

        let inserted = IdempotencyRecordEntity::insert(record)
            .on_conflict(
                OnConflict::column(IdempotencyRecordColumn::KeyHash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        if inserted > 0 {
            return Ok(true);
        }

        // Taken. Reclaim it only if the previous claim has expired.
        let reclaimed = IdempotencyRecordEntity::update_many()
            .col_expr(
                IdempotencyRecordColumn::Outcome,
                Expr::value(idempotency_outcome::IN_FLIGHT),
            )
            .col_expr(IdempotencyRecordColumn::CreatedAt, Expr::value(now))
            .col_expr(IdempotencyRecordColumn::ExpiresAt, Expr::value(expires_at))
            .filter(IdempotencyRecordColumn::KeyHash.eq(key_hash))
            .filter(IdempotencyRecordColumn::ExpiresAt.lt(now))
            .exec(db)
            .await?;

        Ok(reclaimed.rows_affected > 0)
    }

    async fn complete(&self, key_hash: &str) -> Result<()> {
        IdempotencyRecordEntity::update_many()
            .col_expr(
                IdempotencyRecordColumn::Outcome,
                Expr::value(idempotency_outcome::COMPLETED),
            )
            .filter(IdempotencyRecordColumn::KeyHash.eq(key_hash))
            .exec(self.pool.write())
            .await?;
        Ok(())
    }

    async fn release(&self, key_hash: &str) -> Result<()> {
        IdempotencyRecordEntity::delete_many()
            .filter(IdempotencyRecordColumn::KeyHash.eq(key_hash))
            .filter(IdempotencyRecordColumn::Outcome.eq(idempotency_outcome::IN_FLIGHT))
            .exec(self.pool.write())
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now().fixed_offset();
        let result = IdempotencyRecordEntity::delete_many()
            .filter(IdempotencyRecordColumn::ExpiresAt.lt(now))
            .exec(self.pool.write())
            .await?;
        Ok(result.rows_affected)
    }
}

/// Proof that this call owns a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyTicket {
    pub scope: IdempotencyScope,
    pub key_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyOutcome {
    /// No key supplied; the operation runs unprotected
    Unguarded,
    /// First sighting; run the operation, then complete or release the ticket
    Fresh(IdempotencyTicket),
    /// Already seen; skip the side effect
    Duplicate,
}

/// Idempotency guard
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
    fail_open: bool,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration, fail_open: bool) -> Self {
        Self {
            store,
            ttl,
            fail_open,
        }
    }

    /// Check a key before running the guarded operation
    pub async fn verify(
        &self,
        key: Option<&str>,
        scope: IdempotencyScope,
    ) -> Result<IdempotencyOutcome> {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => return Ok(IdempotencyOutcome::Unguarded),
        };
        let hash = key_hash(scope, key);

        match self.store.claim(&hash, scope, self.ttl).await {
            Ok(true) => Ok(IdempotencyOutcome::Fresh(IdempotencyTicket {
                scope,
                key_hash: hash,
            })),
            Ok(false) => {
                info!(scope = scope.as_str(), key_hash = %hash, "Duplicate request short-circuited");
                metrics::record_idempotency_duplicate(scope.as_str());
                Ok(IdempotencyOutcome::Duplicate)
            }
            Err(e) => {
                metrics::record_idempotency_store_error(scope.as_str());
                if self.fail_open {
                    warn!(scope = scope.as_str(), error = %e, "Idempotency store unavailable, proceeding unguarded");
                    Ok(IdempotencyOutcome::Unguarded)
                } else {
                    error!(scope = scope.as_str(), error = %e, "Idempotency store unavailable, rejecting request");
                    Err(AppError::ServiceUnavailable {
                        message: format!("Idempotency check failed: {}", e),
                    })
                }
            }
        }
    }

    /// Mark the operation behind `ticket` as done
    pub async fn complete(&self, ticket: IdempotencyTicket) {
        if let Err(e) = self.store.complete(&ticket.key_hash).await {
            // The claim stays in flight and still blocks duplicates until it expires
            warn!(scope = ticket.scope.as_str(), error = %e, "Failed to mark idempotency key completed");
        }
    }

    /// Free the key of a failed operation
    pub async fn release(&self, ticket: IdempotencyTicket) {
        if let Err(e) = self.store.release(&ticket.key_hash).await {
            warn!(scope = ticket.scope.as_str(), error = %e, "Failed to release idempotency key");
        }
    }

    /// Settle an optional ticket from the result of the guarded operation
    pub async fn settle<T>(&self, ticket: Option<IdempotencyTicket>, result: &Result<T>) {
        match (ticket, result.is_ok()) {
            (Some(ticket), true) => self.complete(ticket).await,
            (Some(ticket), false) => self.release(ticket).await,
            (None, _) => {}
        }
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired().await
    }
}

impl IdempotencyOutcome {
    pub fn into_ticket(self) -> Option<IdempotencyTicket> {
        match self {
            IdempotencyOutcome::Fresh(ticket) => Some(ticket),
            _ => None,
        }
    }
}
