//! Process-wide wiring of the integrity core
//!
//! Built once at startup and shared by every request handler.

use crate::audit::{AuditLogStore, AuditTrail};
use crate::auth::SessionTokens;
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::contact::ContactDesk;
use crate::db::{DbPool, Repository};
use crate::idempotency::{IdempotencyGuard, SeaIdempotencyStore};
use crate::ledger::{PaymentLedger, SeaLedgerStore};
use crate::stats::StatsService;
use crate::tenant::TenantGuard;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct IntegrityCore {
    pub repository: Repository,
    pub tenant_guard: TenantGuard,
    pub idempotency: IdempotencyGuard,
    pub audit: AuditTrail,
    pub audit_log: Arc<AuditLogStore>,
    pub ledger: PaymentLedger,
    pub contact: ContactDesk,
    pub stats: StatsService,
    /// `None` when no signing secret is configured
    pub sessions: Option<Arc<SessionTokens>>,
}

impl IntegrityCore {
    pub fn new(pool: DbPool, cache: Cache, config: &AppConfig) -> Self {
        let repository = Repository::new(pool.clone());
        let tenant_guard = TenantGuard::new(Arc::new(repository.clone()));

        let idempotency = IdempotencyGuard::new(
            Arc::new(SeaIdempotencyStore::new(pool.clone())),
            config.idempotency_ttl(),
            config.idempotency.fail_open,
        );

        let audit_log = Arc::new(AuditLogStore::new(pool));
        let audit = AuditTrail::new(audit_log.clone());

        let ledger = PaymentLedger::new(
            Arc::new(SeaLedgerStore::new(repository.clone())),
            tenant_guard.clone(),
            idempotency.clone(),
            audit.clone(),
            config.retry_jitter(),
        );

        let contact = ContactDesk::new(
            repository.clone(),
            idempotency.clone(),
            config.contact.max_per_window,
            config.contact_window(),
        );

        let stats = StatsService::new(repository.clone(), cache, config.dashboard_ttl());

        let sessions = match config.auth.jwt_secret {
            Some(ref secret) if !secret.is_empty() => Some(Arc::new(SessionTokens::new(
                secret,
                config.auth.jwt_expiration_secs,
            ))),
            _ => {
                warn!("No JWT secret configured, session tokens disabled");
                None
            }
        };

        info!(
            idempotency_fail_open = config.idempotency.fail_open,
            contact_limit = config.contact.max_per_window,
            "Integrity core initialized"
        );

        Self {
            repository,
            tenant_guard,
            idempotency,
            audit,
            audit_log,
            ledger,
            contact,
            stats,
            sessions,
        }
    }
}
