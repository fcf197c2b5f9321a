use serde::{Deserialize, Serialize};

use storegate_auth::{Role, TenantScope};
use storegate_core::{TenantId, UserId};

use crate::context::CallerContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreUserRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub principal_id: UserId,
    pub role: Role,
    pub tenant_id: TenantId,
    /// Listing scope; `null` when unscoped.
    pub scope_tenant_id: Option<TenantId>,
    pub request_id: String,
}

impl From<&CallerContext> for WhoAmIResponse {
    fn from(ctx: &CallerContext) -> Self {
        let principal = ctx.principal();
        Self {
            principal_id: principal.id(),
            role: principal.role(),
            tenant_id: principal.tenant_id(),
            scope_tenant_id: match ctx.scope() {
                TenantScope::Tenant(t) => Some(t),
                TenantScope::Unscoped => None,
            },
            request_id: ctx.request().request_id().to_string(),
        }
    }
}
