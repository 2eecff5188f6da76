//! Metrics and observability utilities
//!
//! Counters and histograms for the integrity core, named with a common
//! prefix. Without an installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all LedgerGuard metrics
pub const METRICS_PREFIX: &str = "ledgerguard";

/// Register all metric descriptions
pub fn register_metrics() {
    // Ledger metrics
    describe_counter!(
        format!("{}_payments_applied_total", METRICS_PREFIX),
        Unit::Count,
        "Payments applied to invoices"
    );

    describe_counter!(
        format!("{}_version_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Conditional invoice updates that matched zero rows"
    );

    describe_counter!(
        format!("{}_payment_retries_exhausted_total", METRICS_PREFIX),
        Unit::Count,
        "Payments rejected after every optimistic attempt conflicted"
    );

    describe_histogram!(
        format!("{}_payment_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end payment application latency in seconds"
    );

    // Guard metrics
    describe_counter!(
        format!("{}_tenant_denials_total", METRICS_PREFIX),
        Unit::Count,
        "Tenant access refusals"
    );

    describe_counter!(
        format!("{}_idempotency_duplicates_total", METRICS_PREFIX),
        Unit::Count,
        "Requests short-circuited by an already seen idempotency key"
    );

    describe_counter!(
        format!("{}_idempotency_store_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Idempotency store failures"
    );

    describe_counter!(
        format!("{}_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Submissions rejected by a rate limit"
    );

    // Audit metrics
    describe_counter!(
        format!("{}_audit_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Audit entries that could not be written"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Times one payment application
pub struct PaymentTimer {
    start: Instant,
}

impl PaymentTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record completion with the outcome label
    pub fn finish(self, outcome: &'static str) {
        histogram!(
            format!("{}_payment_duration_seconds", METRICS_PREFIX),
            "outcome" => outcome
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_payment_applied(attempts: u32) {
    counter!(
        format!("{}_payments_applied_total", METRICS_PREFIX),
        "attempts" => attempts.to_string()
    )
    .increment(1);
}

pub fn record_version_conflict() {
    counter!(format!("{}_version_conflicts_total", METRICS_PREFIX)).increment(1);
}

pub fn record_retries_exhausted() {
    counter!(format!("{}_payment_retries_exhausted_total", METRICS_PREFIX)).increment(1);
}

pub fn record_tenant_denial(resource: &'static str, reason: &'static str) {
    counter!(
        format!("{}_tenant_denials_total", METRICS_PREFIX),
        "resource" => resource,
        "reason" => reason
    )
    .increment(1);
}

pub fn record_idempotency_duplicate(scope: &'static str) {
    counter!(
        format!("{}_idempotency_duplicates_total", METRICS_PREFIX),
        "scope" => scope
    )
    .increment(1);
}

pub fn record_idempotency_store_error(scope: &'static str) {
    counter!(
        format!("{}_idempotency_store_errors_total", METRICS_PREFIX),
        "scope" => scope
    )
    .increment(1);
}

pub fn record_rate_limited(limiter: &'static str) {
    counter!(
        format!("{}_rate_limited_total", METRICS_PREFIX),
        "limiter" => limiter
    )
    .increment(1);
}

pub fn record_audit_failure(entity: &str) {
    counter!(
        format!("{}_audit_failures_total", METRICS_PREFIX),
        "entity" => entity.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}
