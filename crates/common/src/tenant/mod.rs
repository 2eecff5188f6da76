//! Tenant access guard
//!
//! Resolves which company owns a resource and checks that the acting
//! principal may touch it. Admins bypass tenant scoping; every other role
//! must match the owning company exactly. Refusals never say whether the
//! resource exists under someone else.

use crate::auth::{require_principal, Principal, RequestContext, Role};
use crate::errors::{AppError, Result, TenantDenial};
use crate::metrics;
use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Every tenant-scoped resource type.
///
/// Resolution of each kind lives in a single exhaustive `match` in the
/// resolver, so a new variant does not compile until it is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Company,
    Invoice,
    Payment,
    Proposal,
    Project,
    Service,
    Ticket,
    Domain,
    Employee,
    Workplace,
    Note,
    Contact,
    Activity,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::Company,
        ResourceKind::Invoice,
        ResourceKind::Payment,
        ResourceKind::Proposal,
        ResourceKind::Project,
        ResourceKind::Service,
        ResourceKind::Ticket,
        ResourceKind::Domain,
        ResourceKind::Employee,
        ResourceKind::Workplace,
        ResourceKind::Note,
        ResourceKind::Contact,
        ResourceKind::Activity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Company => "company",
            ResourceKind::Invoice => "invoice",
            ResourceKind::Payment => "payment",
            ResourceKind::Proposal => "proposal",
            ResourceKind::Project => "project",
            ResourceKind::Service => "service",
            ResourceKind::Ticket => "ticket",
            ResourceKind::Domain => "domain",
            ResourceKind::Employee => "employee",
            ResourceKind::Workplace => "workplace",
            ResourceKind::Note => "note",
            ResourceKind::Contact => "contact",
            ResourceKind::Activity => "activity",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a resource to the company that owns it
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// `None` when the resource is missing or tombstoned
    async fn owning_tenant(&self, kind: ResourceKind, id: Uuid) -> Result<Option<Uuid>>;
}

/// Identity handed back to callers after a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub user_id: Uuid,
    pub user_role: Role,
    pub user_tenant_id: Option<Uuid>,
}

impl From<&Principal> for AccessGrant {
    fn from(p: &Principal) -> Self {
        Self {
            user_id: p.id,
            user_role: p.role,
            user_tenant_id: p.company_id,
        }
    }
}

/// Query restriction for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantFilter {
    /// Privileged caller, no restriction
    Unrestricted,
    /// Only rows of this company
    Tenant(Uuid),
}

impl TenantFilter {
    /// Condition on the given company column
    pub fn condition<C: ColumnTrait>(&self, company_column: C) -> Condition {
        match self {
            TenantFilter::Unrestricted => Condition::all(),
            TenantFilter::Tenant(id) => Condition::all().add(company_column.eq(*id)),
        }
    }

    pub fn permits(&self, company_id: Uuid) -> bool {
        match self {
            TenantFilter::Unrestricted => true,
            TenantFilter::Tenant(id) => *id == company_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    pub user_id: Uuid,
    pub user_role: Role,
    pub filter: TenantFilter,
}

/// Tenant access guard
#[derive(Clone)]
pub struct TenantGuard {
    resolver: Arc<dyn TenantResolver>,
}

impl TenantGuard {
    pub fn new(resolver: Arc<dyn TenantResolver>) -> Self {
        Self { resolver }
    }

    /// Authorize an operation on an existing resource
    pub async fn require_tenant_access(
        &self,
        ctx: &RequestContext,
        kind: ResourceKind,
        id: Uuid,
    ) -> Result<AccessGrant> {
        let principal = require_principal(ctx)?;
        if principal.role.is_privileged() {
            return Ok(principal.into());
        }

        match self.resolver.owning_tenant(kind, id).await? {
            None => Err(deny(principal, kind, Some(id), TenantDenial::ResourceNotFound)),
            Some(owner) if principal.company_id == Some(owner) => Ok(principal.into()),
            Some(_) => Err(deny(principal, kind, Some(id), TenantDenial::ForeignTenant)),
        }
    }

    /// Authorize creating a resource under `company_id`
    pub fn require_company_access(
        &self,
        ctx: &RequestContext,
        company_id: Uuid,
    ) -> Result<AccessGrant> {
        let principal = require_principal(ctx)?;
        if principal.role.is_privileged() || principal.company_id == Some(company_id) {
            Ok(principal.into())
        } else {
            Err(deny(
                principal,
                ResourceKind::Company,
                Some(company_id),
                TenantDenial::ForeignCompany,
            ))
        }
    }

    /// Filter fragment for list queries
    pub fn tenant_filter(&self, ctx: &RequestContext) -> Result<TenantScope> {
        let principal = require_principal(ctx)?;
        let filter = if principal.role.is_privileged() {
            TenantFilter::Unrestricted
        } else {
            match principal.company_id {
                Some(company_id) => TenantFilter::Tenant(company_id),
                None => {
                    return Err(deny(
                        principal,
                        ResourceKind::Company,
                        None,
                        TenantDenial::UnlinkedAccount,
                    ))
                }
            }
        };

        Ok(TenantScope {
            user_id: principal.id,
            user_role: principal.role,
            filter,
        })
    }
}

fn deny(
    principal: &Principal,
    kind: ResourceKind,
    id: Option<Uuid>,
    reason: TenantDenial,
) -> AppError {
    warn!(
        user_id = %principal.id,
        resource = kind.as_str(),
        resource_id = ?id,
        reason = reason.as_str(),
        "Tenant access denied"
    );
    metrics::record_tenant_denial(kind.as_str(), reason.as_str());
    AppError::tenant(reason)
}
