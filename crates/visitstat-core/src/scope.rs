//! Tenant scoping shared by every query.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which tenants a query applies to.
///
/// Every tenant-scoped predicate renders as
/// `scope is global OR row.tenant_id = scope.tenant_id`, so `Global` matches
/// rows of every tenant (including rows without a tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantScope {
    #[default]
    Global,
    Tenant(i64),
}

impl TenantScope {
    /// The tenant id bound into the optional-equality predicate. `None` is the
    /// wildcard.
    pub fn tenant_id(self) -> Option<i64> {
        match self {
            TenantScope::Global => None,
            TenantScope::Tenant(id) => Some(id),
        }
    }

    pub fn is_global(self) -> bool {
        matches!(self, TenantScope::Global)
    }

    /// Whether a row stored with `tenant_id` is visible under this scope.
    pub fn matches(self, tenant_id: Option<i64>) -> bool {
        match self {
            TenantScope::Global => true,
            TenantScope::Tenant(id) => tenant_id == Some(id),
        }
    }
}

impl From<Option<i64>> for TenantScope {
    fn from(tenant_id: Option<i64>) -> Self {
        tenant_id.map_or(TenantScope::Global, TenantScope::Tenant)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantScope::Global => f.write_str("global"),
            TenantScope::Tenant(id) => write!(f, "tenant:{id}"),
        }
    }
}
