//! Record store gateway
//!
//! The single access point to persisted entities. Reads go to the replica
//! when one is configured, writes to the primary, and every query passes
//! through the soft-delete interception layer.

use crate::db::models::*;
use crate::db::soft_delete::{self, Record};
use crate::db::DbPool;
use crate::errors::Result;
use crate::tenant::{ResourceKind, TenantResolver};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Soft-delete aware CRUD
    // ========================================================================

    pub async fn find_many<E: Record>(&self, filter: Condition) -> Result<Vec<E::Model>> {
        soft_delete::find_many::<E, _>(self.read_conn(), filter)
            .await
            .map_err(Into::into)
    }

    pub async fn find_first<E: Record>(&self, filter: Condition) -> Result<Option<E::Model>> {
        soft_delete::find_first::<E, _>(self.read_conn(), filter)
            .await
            .map_err(Into::into)
    }

    pub async fn find_unique<E: Record>(&self, id: Uuid) -> Result<Option<E::Model>> {
        soft_delete::find_unique::<E, _>(self.read_conn(), id)
            .await
            .map_err(Into::into)
    }

    pub async fn count<E: Record>(&self, filter: Condition) -> Result<u64> {
        soft_delete::count::<E, _>(self.read_conn(), filter)
            .await
            .map_err(Into::into)
    }

    pub async fn sum<E: Record>(&self, column: E::Column, filter: Condition) -> Result<Decimal> {
        soft_delete::sum::<E, _>(self.read_conn(), column, filter)
            .await
            .map_err(Into::into)
    }

    pub async fn group_count<E: Record>(
        &self,
        column: E::Column,
        filter: Condition,
    ) -> Result<Vec<(String, i64)>> {
        soft_delete::group_count::<E, _>(self.read_conn(), column, filter)
            .await
            .map_err(Into::into)
    }

    pub async fn delete<E: Record>(&self, id: Uuid) -> Result<u64> {
        soft_delete::delete::<E, _>(self.write_conn(), id)
            .await
            .map_err(Into::into)
    }

    pub async fn delete_many<E: Record>(&self, filter: Condition) -> Result<u64> {
        soft_delete::delete_many::<E, _>(self.write_conn(), filter)
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Contact Messages
    // ========================================================================

    /// Messages stored from `ip` at or after `since`
    pub async fn count_contact_messages_since(
        &self,
        ip: &str,
        since: DateTime<FixedOffset>,
    ) -> Result<u64> {
        // Read from the primary so a submission that just landed is counted
        soft_delete::count::<ContactMessageEntity, _>(
            self.write_conn(),
            Condition::all()
                .add(ContactMessageColumn::IpAddress.eq(ip))
                .add(ContactMessageColumn::CreatedAt.gte(since)),
        )
        .await
        .map_err(Into::into)
    }

    pub async fn insert_contact_message(
        &self,
        message: ContactMessageActiveModel,
    ) -> Result<ContactMessage> {
        message.insert(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Payments
    // ========================================================================

    /// Live payment recorded against `invoice_id` under an idempotency key
    pub async fn find_payment_by_idempotency_key(
        &self,
        invoice_id: Uuid,
        key: &str,
    ) -> Result<Option<Payment>> {
        soft_delete::find_first::<PaymentEntity, _>(
            self.write_conn(),
            Condition::all()
                .add(PaymentColumn::InvoiceId.eq(invoice_id))
                .add(PaymentColumn::IdempotencyKey.eq(key)),
        )
        .await
        .map_err(Into::into)
    }
}

// ============================================================================
// Tenant resolution
// ============================================================================

impl Repository {
    /// Live row read from the primary. Ownership checks must not lag behind
    /// a tombstone that has not reached the replica yet.
    async fn live<E: Record>(&self, id: Uuid) -> Result<Option<E::Model>> {
        soft_delete::find_unique::<E, _>(self.write_conn(), id)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl TenantResolver for Repository {
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>> {
        let owner = match kind {
            ResourceKind::Company => self.live::<CompanyEntity>(id).await?.map(|c| c.id),
            ResourceKind::Invoice => self.live::<InvoiceEntity>(id).await?.map(|i| i.company_id),
            ResourceKind::Payment => match self.live::<PaymentEntity>(id).await? {
                Some(payment) => self
                    .live::<InvoiceEntity>(payment.invoice_id)
                    .await?
                    .map(|i| i.company_id),
                None => None,
            },
            ResourceKind::Proposal => self.live::<ProposalEntity>(id).await?.map(|p| p.company_id),
            ResourceKind::Project => self.live::<ProjectEntity>(id).await?.map(|p| p.company_id),
            ResourceKind::Service => self.live::<ServiceEntity>(id).await?.map(|s| s.company_id),
            ResourceKind::Ticket => self.live::<TicketEntity>(id).await?.map(|t| t.company_id),
            ResourceKind::Domain => self.live::<DomainEntity>(id).await?.map(|d| d.company_id),
            ResourceKind::Employee => match self.live::<EmployeeEntity>(id).await? {
                Some(employee) => self
                    .live::<WorkplaceEntity>(employee.workplace_id)
                    .await?
                    .map(|w| w.company_id),
                None => None,
            },
            ResourceKind::Workplace => self
                .live::<WorkplaceEntity>(id)
                .await?
                .map(|w| w.company_id),
            ResourceKind::Note => self
                .live::<CompanyNoteEntity>(id)
                .await?
                .map(|n| n.company_id),
            ResourceKind::Contact => self
                .live::<CompanyContactEntity>(id)
                .await?
                .map(|c| c.company_id),
            ResourceKind::Activity => self
                .live::<CompanyActivityEntity>(id)
                .await?
                .map(|a| a.company_id),
        };

        Ok(owner)
    }
}
