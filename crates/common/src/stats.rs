//! Admin dashboard aggregates, computed through the soft-delete gateway
//! and served read-through from the cache

use crate::auth::{require_privileged, RequestContext};
use crate::cache::{keys, Cache};
use crate::db::models::*;
use crate::db::Repository;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use futures::try_join;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, Condition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Ticket states counted as open work
const OPEN_TICKET_STATES: [&str; 2] = ["OPEN", "IN_PROGRESS"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub companies: u64,
    pub workplaces: u64,
    pub users: u64,
    pub open_tickets: u64,
    pub invoices: u64,
    /// Sum of live payments
    pub collected: Decimal,
    /// Unpaid remainder of live, non-cancelled invoices
    pub outstanding: Decimal,
    pub invoices_by_status: BTreeMap<String, i64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StatsService {
    repo: Repository,
    cache: Cache,
    ttl: Duration,
}

impl StatsService {
    pub fn new(repo: Repository, cache: Cache, ttl: Duration) -> Self {
        Self { repo, cache, ttl }
    }

    pub async fn admin_dashboard(&self, ctx: &RequestContext) -> Result<DashboardStats> {
        require_privileged(ctx)?;
        self.cache
            .get_or_load(keys::ADMIN_DASHBOARD, self.ttl, || self.compute())
            .await
    }

    /// Drop the cached aggregates so the next read recomputes them
    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.purge(keys::ADMIN_DASHBOARD).await {
            warn!(error = %e, "Failed to purge dashboard stats");
        }
    }

    async fn compute(&self) -> Result<DashboardStats> {
        let all = Condition::all;
        let billable = || all().add(InvoiceColumn::Status.ne(InvoiceStatus::Cancelled.as_str()));
        let open_filter = all().add(TicketColumn::Status.is_in(OPEN_TICKET_STATES));

        let (companies, workplaces, users, open_tickets, invoices) = try_join!(
            self.repo.count::<CompanyEntity>(all()),
            self.repo.count::<WorkplaceEntity>(all()),
            self.repo.count::<UserEntity>(all()),
            self.repo.count::<TicketEntity>(open_filter),
            self.repo.count::<InvoiceEntity>(all()),
        )?;

        let (collected, billed, paid, by_status) = try_join!(
            self.repo.sum::<PaymentEntity>(PaymentColumn::Amount, all()),
            self.repo.sum::<InvoiceEntity>(InvoiceColumn::Total, billable()),
            self.repo.sum::<InvoiceEntity>(InvoiceColumn::PaidAmount, billable()),
            self.repo.group_count::<InvoiceEntity>(InvoiceColumn::Status, all()),
        )?;

        debug!(companies, invoices, "Dashboard stats computed");
        Ok(DashboardStats {
            companies,
            workplaces,
            users,
            open_tickets,
            invoices,
            collected,
            outstanding: (billed - paid).max(Decimal::ZERO),
            invoices_by_status: by_status.into_iter().collect(),
            generated_at: Utc::now(),
        })
    }
}
