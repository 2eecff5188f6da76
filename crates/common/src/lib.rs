//! LedgerGuard Common Library
//!
//! The record-integrity core shared by every LedgerGuard process:
//! - Soft-delete interception over the record store
//! - Tenant access guard
//! - Optimistic-concurrency payment ledger
//! - Idempotency guard and audit trail
//! - Error types, configuration, metrics and caching

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod contact;
pub mod db;
pub mod errors;
pub mod idempotency;
pub mod integrity;
pub mod ledger;
pub mod metrics;
pub mod stats;
pub mod tenant;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use auth::{Principal, RequestContext, Role};
pub use config::AppConfig;
pub use integrity::IntegrityCore;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use ledger::{PaymentLedger, PaymentOutcome, PaymentRequest};
pub use tenant::{ResourceKind, TenantGuard};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
