//! Periodic purge of expired idempotency keys

use ledgerguard_common::idempotency::IdempotencyGuard;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Run one purge. Failures are logged and retried on the next tick.
pub async fn purge_once(guard: &IdempotencyGuard) -> u64 {
    match guard.purge_expired().await {
        Ok(0) => {
            debug!("No expired idempotency keys");
            0
        }
        Ok(removed) => {
            info!(removed, "Purged expired idempotency keys");
            removed
        }
        Err(e) => {
            error!(error = %e, "Idempotency purge failed");
            0
        }
    }
}

/// Purge every `every` until `shutdown` resolves
pub async fn run<S>(guard: IdempotencyGuard, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                purge_once(&guard).await;
            }
        }
    }
}
