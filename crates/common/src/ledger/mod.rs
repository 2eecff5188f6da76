//! Optimistic-concurrency payment ledger
//!
//! Applies payments to invoices without losing concurrent updates. Each
//! attempt reads the invoice, computes the new paid amount and status, and
//! writes them back only if the version it read is still current. A
//! conditional write that matches no row means another payment won the
//! race; the attempt is discarded and retried from a fresh read, at most
//! [`MAX_PAYMENT_ATTEMPTS`] times. Any other failure propagates at once.

mod store;

pub use store::{
    InvoiceSnapshot, InvoiceUpdate, LedgerStore, LedgerTxn, NewInvoice, NewPayment,
    SeaLedgerStore, SeaLedgerTxn,
};

use crate::audit::{AuditAction, AuditTrail};
use crate::auth::{require_principal, RequestContext};
use crate::db::models::{Invoice, InvoiceStatus, Payment, PaymentMethod};
use crate::errors::{AppError, Result};
use crate::idempotency::{IdempotencyGuard, IdempotencyOutcome, IdempotencyScope};
use crate::metrics::{self, PaymentTimer};
use crate::tenant::{ResourceKind, TenantGuard};
use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempt ceiling for one payment
pub const MAX_PAYMENT_ATTEMPTS: u32 = 3;

/// Status after a payment brings the paid amount to `paid`.
///
/// OVERDUE is owned by the batch job that sets it and survives partial
/// payments; full payment always settles to PAID.
pub fn status_after_payment(
    current: InvoiceStatus,
    paid: Decimal,
    total: Decimal,
) -> InvoiceStatus {
    if paid >= total {
        InvoiceStatus::Paid
    } else if current == InvoiceStatus::Overdue {
        InvoiceStatus::Overdue
    } else if paid > Decimal::ZERO {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Pending
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Defaults to now
    #[serde(default)]
    pub paid_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
    pub version: i32,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Applied(PaymentReceipt),
    /// The key was already used; nothing was charged again. `payment` is
    /// empty while the first call is still in flight.
    AlreadyProcessed { payment: Option<Payment> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRequest {
    pub company_id: Uuid,
    pub invoice_no: String,
    pub total: Decimal,
    #[serde(default)]
    pub due_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvoiceOutcome {
    Created(Invoice),
    AlreadyProcessed,
}

/// Payment ledger
#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn LedgerStore>,
    tenant_guard: TenantGuard,
    idempotency: IdempotencyGuard,
    audit: AuditTrail,
    retry_jitter: Duration,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        tenant_guard: TenantGuard,
        idempotency: IdempotencyGuard,
        audit: AuditTrail,
        retry_jitter: Duration,
    ) -> Self {
        Self {
            store,
            tenant_guard,
            idempotency,
            audit,
            retry_jitter,
        }
    }

    /// Apply a payment: idempotency, then tenant access, then the
    /// optimistic write loop
    pub async fn apply_payment(
        &self,
        ctx: &RequestContext,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome> {
        let timer = PaymentTimer::start();

        if request.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount {
                amount: request.amount,
            });
        }
        require_principal(ctx)?;

        // Payment keys are scoped to the invoice they settle
        let key = payment_key(&request);
        let claim = key.map(|k| format!("{}:{}", request.invoice_id, k));

        let ticket = match self
            .idempotency
            .verify(claim.as_deref(), IdempotencyScope::Payment)
            .await?
        {
            IdempotencyOutcome::Duplicate => {
                let outcome = self.replay(ctx, &request).await;
                timer.finish("duplicate");
                return outcome;
            }
            outcome => outcome.into_ticket(),
        };

        let result = self.apply_guarded(ctx, &request).await;
        self.idempotency.settle(ticket, &result).await;

        timer.finish(match &result {
            Ok(PaymentOutcome::Applied(_)) => "applied",
            Ok(PaymentOutcome::AlreadyProcessed { .. }) => "duplicate",
            Err(_) => "rejected",
        });
        result
    }

    /// Answer a reused key with the payment it produced
    async fn replay(
        &self,
        ctx: &RequestContext,
        request: &PaymentRequest,
    ) -> Result<PaymentOutcome> {
        let payment = match payment_key(request) {
            Some(key) => self.store.find_payment_by_key(request.invoice_id, key).await?,
            None => None,
        };

        // Never hand another tenant's payment back
        if let Some(ref payment) = payment {
            self.tenant_guard
                .require_tenant_access(ctx, ResourceKind::Payment, payment.id)
                .await?;
        }

        info!(
            invoice_id = %request.invoice_id,
            found = payment.is_some(),
            "Payment already processed"
        );
        Ok(PaymentOutcome::AlreadyProcessed { payment })
    }

    async fn apply_guarded(
        &self,
        ctx: &RequestContext,
        request: &PaymentRequest,
    ) -> Result<PaymentOutcome> {
        self.tenant_guard
            .require_tenant_access(ctx, ResourceKind::Invoice, request.invoice_id)
            .await?;

        let outcome = self.apply_with_retries(request).await?;

        if let PaymentOutcome::Applied(ref receipt) = outcome {
            self.audit
                .log_activity(
                    ctx,
                    AuditAction::Create,
                    "Payment",
                    Some(receipt.payment.id.to_string().as_str()),
                    Some(json!({
                        "invoiceId": request.invoice_id,
                        "amount": request.amount.to_string(),
                        "method": request.method.as_str(),
                        "status": receipt.status.as_str(),
                        "attempts": receipt.attempts,
                    })),
                )
                .await;
        }

        Ok(outcome)
    }

    async fn apply_with_retries(&self, request: &PaymentRequest) -> Result<PaymentOutcome> {
        let paid_at = request.paid_at.unwrap_or_else(|| Utc::now().fixed_offset());
        let key = payment_key(request);

        for attempt in 1..=MAX_PAYMENT_ATTEMPTS {
            let mut txn = self.store.begin().await?;

            // The payment row outlives its idempotency claim
            if let Some(key) = key {
                if let Some(payment) = txn.find_payment_by_key(request.invoice_id, key).await? {
                    txn.rollback().await?;
                    info!(
                        invoice_id = %request.invoice_id,
                        payment_id = %payment.id,
                        "Payment key already recorded"
                    );
                    return Ok(PaymentOutcome::AlreadyProcessed {
                        payment: Some(payment),
                    });
                }
            }

            let invoice = txn
                .load_invoice(request.invoice_id)
                .await?
                .ok_or_else(|| AppError::InvoiceNotFound {
                    id: request.invoice_id.to_string(),
                })?;

            if invoice.status == InvoiceStatus::Cancelled {
                return Err(AppError::InvoiceCancelled);
            }

            let outstanding = invoice.total - invoice.paid_amount;
            if request.amount > outstanding {
                return Err(AppError::Overpayment { outstanding });
            }

            let paid_amount = invoice.paid_amount + request.amount;
            let status = status_after_payment(invoice.status, paid_amount, invoice.total);
            let update = InvoiceUpdate {
                id: invoice.id,
                expected_version: invoice.version,
                paid_amount,
                status,
            };

            if txn.update_if_version(&update).await? == 1 {
                let payment = txn
                    .insert_payment(NewPayment {
                        invoice_id: invoice.id,
                        amount: request.amount,
                        method: request.method,
                        reference: request.reference.clone(),
                        notes: request.notes.clone(),
                        paid_at,
                        idempotency_key: key.map(str::to_string),
                    })
                    .await?;
                txn.commit().await?;

                metrics::record_payment_applied(attempt);
                info!(
                    invoice_id = %invoice.id,
                    payment_id = %payment.id,
                    amount = %request.amount,
                    status = status.as_str(),
                    version = invoice.version + 1,
                    attempt,
                    "Payment applied"
                );

                return Ok(PaymentOutcome::Applied(PaymentReceipt {
                    payment,
                    paid_amount,
                    status,
                    version: invoice.version + 1,
                    attempts: attempt,
                }));
            }

            // Lost the race: discard this attempt and start over from a fresh read
            txn.rollback().await?;
            metrics::record_version_conflict();
            debug!(
                invoice_id = %invoice.id,
                version = invoice.version,
                attempt,
                "Invoice version conflict"
            );

            if attempt < MAX_PAYMENT_ATTEMPTS {
                self.pause().await;
            }
        }

        metrics::record_retries_exhausted();
        warn!(
            invoice_id = %request.invoice_id,
            attempts = MAX_PAYMENT_ATTEMPTS,
            "Payment abandoned after repeated version conflicts"
        );
        Err(AppError::Concurrency {
            attempts: MAX_PAYMENT_ATTEMPTS,
        })
    }

    async fn pause(&self) {
        let max_ms = self.retry_jitter.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        tokio::time::sleep(jitter(max_ms)).await;
    }

    /// Open a new invoice under a company
    pub async fn create_invoice(
        &self,
        ctx: &RequestContext,
        request: InvoiceRequest,
    ) -> Result<InvoiceOutcome> {
        if request.total <= Decimal::ZERO {
            return Err(AppError::InvalidAmount {
                amount: request.total,
            });
        }
        if request.invoice_no.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Fatura numarası gerekli.".to_string(),
                field: Some("invoice_no".to_string()),
            });
        }
        require_principal(ctx)?;

        let ticket = match self
            .idempotency
            .verify(request.idempotency_key.as_deref(), IdempotencyScope::InvoiceCreate)
            .await?
        {
            IdempotencyOutcome::Duplicate => return Ok(InvoiceOutcome::AlreadyProcessed),
            outcome => outcome.into_ticket(),
        };

        let result = self.create_invoice_guarded(ctx, request).await;
        self.idempotency.settle(ticket, &result).await;
        result.map(InvoiceOutcome::Created)
    }

    async fn create_invoice_guarded(
        &self,
        ctx: &RequestContext,
        request: InvoiceRequest,
    ) -> Result<Invoice> {
        self.tenant_guard
            .require_company_access(ctx, request.company_id)?;

        let invoice = self
            .store
            .insert_invoice(NewInvoice {
                company_id: request.company_id,
                invoice_no: request.invoice_no.trim().to_string(),
                total: request.total,
                due_date: request.due_date,
            })
            .await?;

        self.audit
            .log_activity(
                ctx,
                AuditAction::Create,
                "Invoice",
                Some(invoice.id.to_string().as_str()),
                Some(json!({
                    "companyId": invoice.company_id,
                    "invoiceNo": invoice.invoice_no,
                    "total": invoice.total.to_string(),
                })),
            )
            .await;

        Ok(invoice)
    }
}

/// Trimmed idempotency key, `None` when absent or blank
fn payment_key(request: &PaymentRequest) -> Option<&str> {
    request
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn jitter(max_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
