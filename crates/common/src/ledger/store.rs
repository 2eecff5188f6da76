//! Storage seam of the payment ledger
//!
//! A ledger transaction reads one invoice, applies a version-conditional
//! update and inserts the payment row. Dropping a transaction without
//! committing it rolls it back.

use crate::db::models::*;
use crate::db::{soft_delete, DbPool, Repository};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

/// Invoice fields the ledger reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSnapshot {
    pub id: Uuid,
    pub company_id: Uuid,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
    pub version: i32,
}

impl TryFrom<Invoice> for InvoiceSnapshot {
    type Error = AppError;

    fn try_from(invoice: Invoice) -> Result<Self> {
        let status = invoice
            .invoice_status()
            .map_err(|message| AppError::Internal { message })?;
        Ok(Self {
            id: invoice.id,
            company_id: invoice.company_id,
            total: invoice.total,
            paid_amount: invoice.paid_amount,
            status,
            version: invoice.version,
        })
    }
}

/// Conditional update: applies only while the stored version still equals
/// `expected_version`, and bumps it by one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub id: Uuid,
    pub expected_version: i32,
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: DateTime<FixedOffset>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub company_id: Uuid,
    pub invoice_no: String,
    pub total: Decimal,
    pub due_date: Option<DateTime<FixedOffset>>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>>;

    /// Live payment recorded against `invoice_id` under an idempotency key
    async fn find_payment_by_key(&self, invoice_id: Uuid, key: &str) -> Result<Option<Payment>>;

    /// Insert a fresh invoice: nothing paid, PENDING, version 1
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice>;
}

#[async_trait]
pub trait LedgerTxn: Send {
    /// Live invoice, `None` when missing or tombstoned
    async fn load_invoice(&mut self, id: Uuid) -> Result<Option<InvoiceSnapshot>>;

    /// Rows affected: 1 on success, 0 when another writer got there first
    async fn update_if_version(&mut self, update: &InvoiceUpdate) -> Result<u64>;

    /// Same lookup as [`LedgerStore::find_payment_by_key`], inside the transaction
    async fn find_payment_by_key(
        &mut self,
        invoice_id: Uuid,
        key: &str,
    ) -> Result<Option<Payment>>;

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// SeaORM ledger store
pub struct SeaLedgerStore {
    repo: Repository,
}

impl SeaLedgerStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    fn pool(&self) -> &DbPool {
        self.repo.pool()
    }
}

#[async_trait]
impl LedgerStore for SeaLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>> {
        let txn = self.pool().write().begin().await?;
        Ok(Box::new(SeaLedgerTxn { txn }))
    }

    async fn find_payment_by_key(&self, invoice_id: Uuid, key: &str) -> Result<Option<Payment>> {
        self.repo.find_payment_by_idempotency_key(invoice_id, key).await
    }

    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice> {
        let now = Utc::now().fixed_offset();
        InvoiceActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(invoice.company_id),
            invoice_no: Set(invoice.invoice_no),
            total: Set(invoice.total),
            paid_amount: Set(Decimal::ZERO),
            status: Set(InvoiceStatus::Pending.as_str().to_string()),
            version: Set(1),
            due_date: Set(invoice.due_date),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.pool().write())
        .await
        .map_err(Into::into)
    }
}

pub struct SeaLedgerTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl LedgerTxn for SeaLedgerTxn {
    async fn load_invoice(&mut self, id: Uuid) -> Result<Option<InvoiceSnapshot>> {
        soft_delete::find_unique::<InvoiceEntity, _>(&self.txn, id)
            .await?
            .map(InvoiceSnapshot::try_from)
            .transpose()
    }

    async fn update_if_version(&mut self, update: &InvoiceUpdate) -> Result<u64> {
        let result = InvoiceEntity::update_many()
            .col_expr(InvoiceColumn::PaidAmount, Expr::value(update.paid_amount))
            .col_expr(InvoiceColumn::Status, Expr::value(update.status.as_str()))
            .col_expr(
                InvoiceColumn::Version,
                Expr::col(InvoiceColumn::Version).add(1),
            )
            .col_expr(
                InvoiceColumn::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(InvoiceColumn::Id.eq(update.id))
            .filter(InvoiceColumn::Version.eq(update.expected_version))
            .filter(InvoiceColumn::DeletedAt.is_null())
            .exec(&self.txn)
            .await?;

        Ok(result.rows_affected)
    }

    async fn find_payment_by_key(
        &mut self,
        invoice_id: Uuid,
        key: &str,
    ) -> Result<Option<Payment>> {
        soft_delete::find_first::<PaymentEntity, _>(
            &self.txn,
            Condition::all()
                .add(PaymentColumn::InvoiceId.eq(invoice_id))
                .add(PaymentColumn::IdempotencyKey.eq(key)),
        )
        .await
        .map_err(Into::into)
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        PaymentActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(payment.invoice_id),
            amount: Set(payment.amount),
            method: Set(payment.method.as_str().to_string()),
            reference: Set(payment.reference),
            notes: Set(payment.notes),
            idempotency_key: Set(payment.idempotency_key),
            paid_at: Set(payment.paid_at),
            deleted_at: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.txn)
        .await
        .map_err(Into::into)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await.map_err(Into::into)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().await.map_err(Into::into)
    }
}
