//! Identity binding (IDOR defense).
//!
//! The verified credential is the only source of tenant identity. The tenant
//! claim a client sends alongside it is checked against the credential and,
//! except for SUPERADMIN, never used for anything else.

use thiserror::Error;

use storegate_core::TenantId;

use crate::decision::{Denial, ErrorCode};
use crate::{BoundIdentity, JwtClaims, Principal, Role, TenantScope};

/// Client-facing message for every tenant binding failure.
pub const TENANT_BINDING_MESSAGE: &str = "invalid tenant context";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("authentication required")]
    Unauthenticated,

    /// Missing, malformed or mismatched tenant claim. Deliberately carries no detail.
    #[error("{}", TENANT_BINDING_MESSAGE)]
    TenantBindingFailed,

    #[error("credential carries an unrecognized role")]
    UnrecognizedRole,
}

impl From<BindingError> for Denial {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::Unauthenticated => Denial::new(ErrorCode::Unauthenticated, err.to_string()),
            BindingError::TenantBindingFailed => {
                Denial::new(ErrorCode::TenantBindingFailed, TENANT_BINDING_MESSAGE)
            }
            BindingError::UnrecognizedRole => Denial::new(ErrorCode::UnauthorizedRole, err.to_string()),
        }
    }
}

/// Derives the trusted [`Principal`] for a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBinder;

impl IdentityBinder {
    pub fn new() -> Self {
        Self
    }

    /// Bind `claims` (already verified) with the client's tenant claim.
    ///
    /// - no credential: `Unauthenticated`
    /// - SUPERADMIN: a well-formed tenant claim narrows listing scope; absent means unscoped
    /// - everyone else: the claim must be present and byte-equal to the credential tenant
    pub fn bind(
        &self,
        claims: Option<&JwtClaims>,
        tenant_claim: Option<&str>,
    ) -> Result<BoundIdentity, BindingError> {
        let claims = claims.ok_or(BindingError::Unauthenticated)?;

        let role: Role = claims.role.parse().map_err(|_| {
            tracing::warn!(
                target: "storegate::security",
                principal_id = %claims.sub,
                role = %claims.role,
                "credential carries an unrecognized role"
            );
            BindingError::UnrecognizedRole
        })?;

        let principal = Principal::new(claims.sub, role, claims.tenant_id);

        if role == Role::SuperAdmin {
            let scope = match tenant_claim {
                None => TenantScope::Unscoped,
                Some(raw) => match raw.parse::<TenantId>() {
                    Ok(tenant_id) => TenantScope::Tenant(tenant_id),
                    Err(_) => {
                        tracing::warn!(
                            target: "storegate::security",
                            principal_id = %claims.sub,
                            claimed_tenant = raw,
                            "malformed tenant claim from superadmin"
                        );
                        return Err(BindingError::TenantBindingFailed);
                    }
                },
            };
            return Ok(BoundIdentity { principal, scope });
        }

        let credential_tenant = claims.tenant_id.to_string();
        match tenant_claim {
            None => {
                tracing::warn!(
                    target: "storegate::security",
                    principal_id = %claims.sub,
                    credential_tenant = %credential_tenant,
                    "tenant claim missing"
                );
                Err(BindingError::TenantBindingFailed)
            }
            Some(raw) if raw != credential_tenant => {
                tracing::error!(
                    target: "storegate::security",
                    severity = "CRITICAL",
                    principal_id = %claims.sub,
                    role = %role,
                    credential_tenant = %credential_tenant,
                    claimed_tenant = raw,
                    "tenant claim does not match credential"
                );
                Err(BindingError::TenantBindingFailed)
            }
            Some(_) => Ok(BoundIdentity {
                principal,
                scope: TenantScope::Tenant(claims.tenant_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use storegate_core::UserId;

    fn claims(role: &str, tenant_id: TenantId) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            tenant_id,
            role: role.to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn no_credential_is_unauthenticated() {
        let err = IdentityBinder::new().bind(None, Some("anything")).unwrap_err();
        assert_eq!(err, BindingError::Unauthenticated);
        assert_eq!(Denial::from(err).status, 401);
    }

    #[test]
    fn matching_claim_binds_to_credential_tenant() {
        let t1 = TenantId::new();
        let c = claims("CLIENTE_ADMIN", t1);
        let bound = IdentityBinder::new()
            .bind(Some(&c), Some(&t1.to_string()))
            .unwrap();
        assert_eq!(bound.principal.tenant_id(), t1);
        assert_eq!(bound.principal.role(), Role::ClienteAdmin);
        assert_eq!(bound.principal.id(), c.sub);
        assert_eq!(bound.scope, TenantScope::Tenant(t1));
    }

    #[test]
    fn mismatched_claim_is_rejected_for_every_non_superadmin_role() {
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        for role in ["OPERADOR", "CLIENTE_ADMIN", "CLIENTE_USER"] {
            let c = claims(role, t1);
            let err = IdentityBinder::new()
                .bind(Some(&c), Some(&t2.to_string()))
                .unwrap_err();
            assert_eq!(err, BindingError::TenantBindingFailed, "{role}");
        }
    }

    #[test]
    fn missing_and_mismatched_look_identical_to_the_client() {
        let t1 = TenantId::new();
        let c = claims("OPERADOR", t1);
        let binder = IdentityBinder::new();

        let missing = Denial::from(binder.bind(Some(&c), None).unwrap_err());
        let mismatch = Denial::from(
            binder
                .bind(Some(&c), Some(&TenantId::new().to_string()))
                .unwrap_err(),
        );

        assert_eq!(missing, mismatch);
        assert_eq!(missing.status, 403);
        assert_eq!(missing.code, ErrorCode::TenantBindingFailed);
        assert!(!missing.message.contains(&t1.to_string()));
    }

    #[test]
    fn claim_comparison_is_exact() {
        let t1 = TenantId::new();
        let c = claims("CLIENTE_USER", t1);
        let upper = t1.to_string().to_uppercase();
        let padded = format!(" {t1}");
        let binder = IdentityBinder::new();
        assert!(binder.bind(Some(&c), Some(&upper)).is_err());
        assert!(binder.bind(Some(&c), Some(&padded)).is_err());
    }

    #[test]
    fn superadmin_claim_is_a_scope_filter() {
        let home = TenantId::new();
        let other = TenantId::new();
        let c = claims("SUPERADMIN", home);
        let binder = IdentityBinder::new();

        let scoped = binder.bind(Some(&c), Some(&other.to_string())).unwrap();
        assert_eq!(scoped.scope, TenantScope::Tenant(other));
        // The principal's own tenant still comes from the credential.
        assert_eq!(scoped.principal.tenant_id(), home);

        let unscoped = binder.bind(Some(&c), None).unwrap();
        assert_eq!(unscoped.scope, TenantScope::Unscoped);

        assert_eq!(
            binder.bind(Some(&c), Some("not-a-tenant")).unwrap_err(),
            BindingError::TenantBindingFailed
        );
    }

    #[test]
    fn unknown_role_is_refused() {
        let t1 = TenantId::new();
        let c = claims("ROOT", t1);
        let err = IdentityBinder::new()
            .bind(Some(&c), Some(&t1.to_string()))
            .unwrap_err();
        assert_eq!(err, BindingError::UnrecognizedRole);
        assert_eq!(Denial::from(err).code, ErrorCode::UnauthorizedRole);
    }
}
