//! LedgerGuard Maintenance Worker
//!
//! Runs alongside the web processes:
//! 1. Bootstraps the schema when configured to
//! 2. Drops stale dashboard aggregates left by a previous deploy
//! 3. Purges expired idempotency keys on a fixed interval until shutdown

mod sweep;

use ledgerguard_common::{
    cache::{keys, Cache},
    config::AppConfig,
    db::{schema, DbPool},
    idempotency::{IdempotencyGuard, SeaIdempotencyStore},
    metrics, VERSION,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting LedgerGuard worker v{}", VERSION
    );

    // Initialize metrics
    match config.metrics_addr() {
        Some(addr) => {
            PrometheusBuilder::new().with_http_listener(addr).install()?;
            metrics::register_metrics();
            info!(%addr, "Prometheus metrics listener started");
        }
        None => info!("Metrics disabled"),
    }

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    db.ping().await?;

    if config.database.sync_schema {
        schema::sync(db.write()).await?;
    }

    match Cache::from_config(&config).await {
        Ok(cache) => {
            if let Err(e) = cache.purge(keys::ADMIN_DASHBOARD).await {
                warn!(error = %e, "Failed to reset dashboard cache");
            }
        }
        Err(e) => warn!(error = %e, "Cache unavailable, skipping reset"),
    }

    let guard = IdempotencyGuard::new(
        Arc::new(SeaIdempotencyStore::new(db.clone())),
        config.idempotency_ttl(),
        config.idempotency.fail_open,
    );

    info!(
        interval_secs = config.purge_interval().as_secs(),
        "Worker ready, purging expired idempotency keys"
    );
    sweep::run(guard, config.purge_interval(), shutdown_signal()).await;

    info!("Worker shutting down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
