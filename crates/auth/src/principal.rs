use serde::Serialize;

use storegate_core::{TenantId, UserId};

use crate::Role;

/// The authenticated caller's trusted identity for one request.
///
/// Built by [`crate::IdentityBinder`] from the verified credential only. The
/// tenant here is the credential's tenant; client-supplied tenant claims are
/// never merged into it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: UserId,
    role: Role,
    tenant_id: TenantId,
}

impl Principal {
    pub fn new(id: UserId, role: Role, tenant_id: TenantId) -> Self {
        Self {
            id,
            role,
            tenant_id,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// Which tenants a request may enumerate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum TenantScope {
    /// Restricted to a single tenant.
    Tenant(TenantId),
    /// No tenant restriction (SUPERADMIN without a tenant claim).
    Unscoped,
}

impl TenantScope {
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            TenantScope::Tenant(t) => Some(*t),
            TenantScope::Unscoped => None,
        }
    }
}

/// Output of identity binding: the principal plus its listing scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct BoundIdentity {
    pub principal: Principal,
    pub scope: TenantScope,
}
