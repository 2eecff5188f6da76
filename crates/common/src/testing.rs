//! Shared test fixtures: an in-memory database, seeders, request contexts
//! and in-process doubles for every storage seam.

use crate::audit::{AuditSink, NewAuditEntry};
use crate::auth::{Principal, RequestContext, Role};
use crate::db::models::*;
use crate::db::{schema, DbPool};
use crate::errors::{AppError, Result};
use crate::idempotency::{IdempotencyScope, IdempotencyStore};
use crate::ledger::{InvoiceSnapshot, InvoiceUpdate, LedgerStore, LedgerTxn, NewInvoice, NewPayment};
use crate::tenant::{ResourceKind, TenantResolver};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

// ============================================================================
// Database
// ============================================================================

/// Fresh in-memory SQLite database with every table created.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn sqlite_pool() -> DbPool {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let conn = Database::connect(options).await.unwrap();
    schema::sync(&conn).await.unwrap();
    DbPool::from_connection(conn)
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub async fn seed_company(db: &DatabaseConnection, name: &str) -> Company {
    CompanyActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        tax_number: Set(None),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_user(db: &DatabaseConnection, company_id: Uuid, email: &str) -> User {
    UserActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(None),
        role: Set(Role::Client.as_str().to_string()),
        company_id: Set(Some(company_id)),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Open invoice with nothing paid
pub async fn seed_invoice(db: &DatabaseConnection, company_id: Uuid, total: &str) -> Invoice {
    InvoiceActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        invoice_no: Set(format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8])),
        total: Set(dec(total)),
        paid_amount: Set(Decimal::ZERO),
        status: Set(InvoiceStatus::Pending.as_str().to_string()),
        version: Set(1),
        due_date: Set(None),
        deleted_at: Set(None),
        created_at: Set(now()),
        updated_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

async fn insert_payment(
    db: &DatabaseConnection,
    invoice_id: Uuid,
    amount: &str,
    key: Option<&str>,
) -> Payment {
    PaymentActiveModel {
        id: Set(Uuid::new_v4()),
        invoice_id: Set(invoice_id),
        amount: Set(dec(amount)),
        method: Set(PaymentMethod::Bank.as_str().to_string()),
        reference: Set(None),
        notes: Set(None),
        idempotency_key: Set(key.map(str::to_string)),
        paid_at: Set(now()),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_payment(db: &DatabaseConnection, invoice_id: Uuid, amount: &str) -> Payment {
    insert_payment(db, invoice_id, amount, None).await
}

pub async fn seed_keyed_payment(
    db: &DatabaseConnection,
    invoice_id: Uuid,
    amount: &str,
    key: &str,
) -> Payment {
    insert_payment(db, invoice_id, amount, Some(key)).await
}

pub async fn seed_workplace(db: &DatabaseConnection, company_id: Uuid, title: &str) -> Workplace {
    WorkplaceActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        title: Set(title.to_string()),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_employee(db: &DatabaseConnection, workplace_id: Uuid, full_name: &str) -> Employee {
    EmployeeActiveModel {
        id: Set(Uuid::new_v4()),
        workplace_id: Set(workplace_id),
        full_name: Set(full_name.to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_domain(db: &DatabaseConnection, company_id: Uuid, name: &str) -> Domain {
    DomainActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        name: Set(name.to_string()),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_ticket(db: &DatabaseConnection, company_id: Uuid, status: &str) -> Ticket {
    TicketActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        subject: Set("Fatura sorusu".to_string()),
        status: Set(status.to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_contact_message(
    db: &DatabaseConnection,
    ip: &str,
    created_at: DateTime<FixedOffset>,
) -> ContactMessage {
    ContactMessageActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Ayşe Yılmaz".to_string()),
        email: Set("ayse@example.com".to_string()),
        phone: Set(None),
        message: Set("Teklif almak istiyorum.".to_string()),
        ip_address: Set(Some(ip.to_string())),
        user_agent: Set(None),
        consent_at: Set(created_at),
        read: Set(false),
        created_at: Set(created_at),
    }
    .insert(db)
    .await
    .unwrap()
}

/// One live resource of every kind under `company_id`
pub async fn seed_every_resource(
    db: &DatabaseConnection,
    company_id: Uuid,
) -> Vec<(ResourceKind, Uuid)> {
    let invoice = seed_invoice(db, company_id, "400.00").await;
    let payment = seed_payment(db, invoice.id, "100.00").await;
    let workplace = seed_workplace(db, company_id, "Merkez").await;
    let employee = seed_employee(db, workplace.id, "Zeynep Arslan").await;
    let domain = seed_domain(db, company_id, "ornek.com.tr").await;
    let ticket = seed_ticket(db, company_id, "OPEN").await;

    let proposal = ProposalActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        title: Set("Web sitesi yenileme".to_string()),
        status: Set("DRAFT".to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    let project = ProjectActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        name: Set("Kurumsal site".to_string()),
        status: Set("ACTIVE".to_string()),
        deleted_at: Set(None),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    let service = ServiceActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        name: Set("Hosting".to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    let note = CompanyNoteActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        content: Set("Yıllık sözleşme yenilenecek".to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    let contact = CompanyContactActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        full_name: Set("Can Öztürk".to_string()),
        email: Set(Some("can@example.com".to_string())),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    let activity = CompanyActivityActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        summary: Set("Telefon görüşmesi".to_string()),
        created_at: Set(now()),
    }
    .insert(db)
    .await
    .unwrap();

    vec![
        (ResourceKind::Company, company_id),
        (ResourceKind::Invoice, invoice.id),
        (ResourceKind::Payment, payment.id),
        (ResourceKind::Proposal, proposal.id),
        (ResourceKind::Project, project.id),
        (ResourceKind::Service, service.id),
        (ResourceKind::Ticket, ticket.id),
        (ResourceKind::Domain, domain.id),
        (ResourceKind::Employee, employee.id),
        (ResourceKind::Workplace, workplace.id),
        (ResourceKind::Note, note.id),
        (ResourceKind::Contact, contact.id),
        (ResourceKind::Activity, activity.id),
    ]
}

// ============================================================================
// Request contexts
// ============================================================================

pub fn admin_ctx() -> RequestContext {
    RequestContext::for_principal(Principal {
        id: Uuid::new_v4(),
        email: "admin@example.com".to_string(),
        name: Some("Yönetici".to_string()),
        role: Role::Admin,
        company_id: None,
    })
}

pub fn client_ctx(tenant: Uuid) -> RequestContext {
    RequestContext::for_principal(Principal {
        id: Uuid::new_v4(),
        email: "musteri@example.com".to_string(),
        name: Some("Müşteri".to_string()),
        role: Role::Client,
        company_id: Some(tenant),
    })
}

pub fn unlinked_client_ctx() -> RequestContext {
    RequestContext::for_principal(Principal {
        id: Uuid::new_v4(),
        email: "yeni@example.com".to_string(),
        name: None,
        role: Role::Client,
        company_id: None,
    })
}

fn offline() -> AppError {
    AppError::Database(DbErr::Custom("store offline".to_string()))
}

// ============================================================================
// Tenant resolution
// ============================================================================

/// Resolver over a fixed ownership table
#[derive(Default)]
pub struct StaticTenantResolver {
    owners: HashMap<(ResourceKind, Uuid), Uuid>,
    ledger: Option<Arc<ScriptedLedgerStore>>,
}

impl StaticTenantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn own(mut self, kind: ResourceKind, id: Uuid, tenant: Uuid) -> Self {
        self.owners.insert((kind, id), tenant);
        self
    }

    /// Also resolve payments recorded in `ledger` through their invoice
    pub fn with_payments_of(mut self, ledger: Arc<ScriptedLedgerStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>> {
        if let Some(owner) = self.owners.get(&(kind, id)) {
            return Ok(Some(*owner));
        }
        let invoice_id = match (kind, &self.ledger) {
            (ResourceKind::Payment, Some(ledger)) => ledger.payment_invoice(id),
            _ => None,
        };
        Ok(invoice_id.and_then(|invoice| self.owners.get(&(ResourceKind::Invoice, invoice)).copied()))
    }
}

// ============================================================================
// Idempotency
// ============================================================================

#[derive(Default)]
pub struct MemoryIdempotencyStore {
    keys: Mutex<HashMap<String, (&'static str, Instant)>>,
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn claim(&self, key_hash: &str, _scope: IdempotencyScope, ttl: Duration) -> Result<bool> {
        let mut keys = self.keys.lock().unwrap();
        let now = Instant::now();
        match keys.get(key_hash) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                keys.insert(key_hash.to_string(), (idempotency_outcome::IN_FLIGHT, now + ttl));
                Ok(true)
            }
        }
    }

    async fn complete(&self, key_hash: &str) -> Result<()> {
        if let Some(entry) = self.keys.lock().unwrap().get_mut(key_hash) {
            entry.0 = idempotency_outcome::COMPLETED;
        }
        Ok(())
    }

    async fn release(&self, key_hash: &str) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        if matches!(keys.get(key_hash), Some((outcome, _)) if *outcome == idempotency_outcome::IN_FLIGHT) {
            keys.remove(key_hash);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut keys = self.keys.lock().unwrap();
        let before = keys.len();
        let now = Instant::now();
        keys.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - keys.len()) as u64)
    }
}

pub struct FailingIdempotencyStore;

#[async_trait]
impl IdempotencyStore for FailingIdempotencyStore {
    async fn claim(&self, _: &str, _: IdempotencyScope, _: Duration) -> Result<bool> {
        Err(offline())
    }

    async fn complete(&self, _: &str) -> Result<()> {
        Err(offline())
    }

    async fn release(&self, _: &str) -> Result<()> {
        Err(offline())
    }

    async fn purge_expired(&self) -> Result<u64> {
        Err(offline())
    }
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<NewAuditEntry>>,
}

impl RecordingAuditSink {
    pub fn entries(&self) -> Vec<NewAuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append(&self, entry: NewAuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, _: NewAuditEntry) -> Result<()> {
        Err(offline())
    }
}

// ============================================================================
// Ledger
// ============================================================================

impl LedgerState {
    fn payment_by_key(&self, invoice_id: Uuid, key: &str) -> Option<Payment> {
        self.payments
            .iter()
            .find(|p| p.invoice_id == invoice_id && p.idempotency_key.as_deref() == Some(key))
            .cloned()
    }
}

#[derive(Default)]
struct LedgerState {
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<Payment>,
    update_calls: Vec<InvoiceUpdate>,
    forced_conflicts: u32,
    begins: usize,
    rollbacks: usize,
    yield_on_read: bool,
}

/// In-memory ledger store with scriptable version conflicts.
///
/// Conditional updates are checked against the stored version exactly like
/// the database does; payments become visible only on commit.
#[derive(Default)]
pub struct ScriptedLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl ScriptedLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_invoice(
        &self,
        company_id: Uuid,
        total: Decimal,
        paid_amount: Decimal,
        status: InvoiceStatus,
        version: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().invoices.insert(
            id,
            Invoice {
                id,
                company_id,
                invoice_no: format!("INV-{}", &id.simple().to_string()[..8]),
                total,
                paid_amount,
                status: status.as_str().to_string(),
                version,
                due_date: None,
                deleted_at: None,
                created_at: now(),
                updated_at: now(),
            },
        );
        id
    }

    /// The next `n` conditional updates report a lost race
    pub fn force_conflicts(&self, n: u32) {
        self.state.lock().unwrap().forced_conflicts = n;
    }

    /// Yield to the scheduler after every invoice read
    pub fn yield_on_read(&self, enabled: bool) {
        self.state.lock().unwrap().yield_on_read = enabled;
    }

    pub fn invoice(&self, id: Uuid) -> Invoice {
        self.state.lock().unwrap().invoices[&id].clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state.lock().unwrap().payments.clone()
    }

    pub fn update_calls(&self) -> Vec<InvoiceUpdate> {
        self.state.lock().unwrap().update_calls.clone()
    }

    pub fn begins(&self) -> usize {
        self.state.lock().unwrap().begins
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }

    fn payment_invoice(&self, payment_id: Uuid) -> Option<Uuid> {
        self.state
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .map(|p| p.invoice_id)
    }
}

#[async_trait]
impl LedgerStore for ScriptedLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>> {
        self.state.lock().unwrap().begins += 1;
        Ok(Box::new(ScriptedLedgerTxn {
            state: self.state.clone(),
            pending: Vec::new(),
        }))
    }

    async fn find_payment_by_key(&self, invoice_id: Uuid, key: &str) -> Result<Option<Payment>> {
        Ok(self.state.lock().unwrap().payment_by_key(invoice_id, key))
    }

    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice> {
        let id = Uuid::new_v4();
        let model = Invoice {
            id,
            company_id: invoice.company_id,
            invoice_no: invoice.invoice_no,
            total: invoice.total,
            paid_amount: Decimal::ZERO,
            status: InvoiceStatus::Pending.as_str().to_string(),
            version: 1,
            due_date: invoice.due_date,
            deleted_at: None,
            created_at: now(),
            updated_at: now(),
        };
        self.state.lock().unwrap().invoices.insert(id, model.clone());
        Ok(model)
    }
}

struct ScriptedLedgerTxn {
    state: Arc<Mutex<LedgerState>>,
    pending: Vec<Payment>,
}

#[async_trait]
impl LedgerTxn for ScriptedLedgerTxn {
    async fn load_invoice(&mut self, id: Uuid) -> Result<Option<InvoiceSnapshot>> {
        let (invoice, yield_now) = {
            let state = self.state.lock().unwrap();
            let invoice = state
                .invoices
                .get(&id)
                .filter(|i| i.deleted_at.is_none())
                .cloned();
            (invoice, state.yield_on_read)
        };
        if yield_now {
            tokio::task::yield_now().await;
        }
        invoice.map(InvoiceSnapshot::try_from).transpose()
    }

    async fn update_if_version(&mut self, update: &InvoiceUpdate) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.update_calls.push(update.clone());
        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Ok(0);
        }
        match state.invoices.get_mut(&update.id) {
            Some(invoice) if invoice.version == update.expected_version && invoice.deleted_at.is_none() => {
                invoice.paid_amount = update.paid_amount;
                invoice.status = update.status.as_str().to_string();
                invoice.version += 1;
                invoice.updated_at = now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_payment_by_key(
        &mut self,
        invoice_id: Uuid,
        key: &str,
    ) -> Result<Option<Payment>> {
        Ok(self.state.lock().unwrap().payment_by_key(invoice_id, key))
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let model = Payment {
            id: Uuid::new_v4(),
            invoice_id: payment.invoice_id,
            amount: payment.amount,
            method: payment.method.as_str().to_string(),
            reference: payment.reference,
            notes: payment.notes,
            idempotency_key: payment.idempotency_key,
            paid_at: payment.paid_at,
            deleted_at: None,
            created_at: now(),
        };
        self.pending.push(model.clone());
        Ok(model)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let ScriptedLedgerTxn { state, pending } = *self;
        state.lock().unwrap().payments.extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
