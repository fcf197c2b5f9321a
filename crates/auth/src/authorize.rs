//! The authorization pipeline.
//!
//! Every user-management request runs the same ordered gates:
//!
//! 1. parameter validation (no audit, no storage access)
//! 2. coarse role gate
//! 3. target existence
//! 4. tenant scope (SUPERADMIN bypasses)
//! 5. relationship: deletion matrix for DELETE/RESTORE, field matrix for UPDATE
//! 6. self-action prevention (DELETE)
//! 7. state precondition (RESTORE)
//!
//! The first failing gate produces the [`Decision`]; nothing after it runs.
//! Gates 2 onwards always produce exactly one [`AuditEvent`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::Instrument;

use storegate_core::UserId;

use crate::audit::{AuditEvent, AuditSink};
use crate::context::RequestContext;
use crate::decision::{Decision, Denial, ErrorCode};
use crate::sanitize::ResponseSanitizer;
use crate::store::{Mutation, MutationError, MutationResult, StoreError, TransactionalMutator, TxOptions, UserDirectory};
use crate::{Action, BoundIdentity, PermissionMatrices, Principal, UserField, UserPatch, UserRecord};

/// Stored in the audit event when a restore carries no reason.
pub const DEFAULT_RESTORE_REASON: &str = "no reason provided";

pub const MAX_RESTORE_REASON_LEN: usize = 500;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound for one mutation transaction; the request deadline may shorten it.
    pub mutation_timeout: Duration,
    pub restore_reason_max_len: usize,
    /// How long a decision waits for audit delivery before returning anyway.
    pub audit_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mutation_timeout: Duration::from_millis(5_000),
            restore_reason_max_len: MAX_RESTORE_REASON_LEN,
            audit_grace: Duration::from_millis(1_000),
        }
    }
}

/// One user-management request, with its action-specific input.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UserOperation<'a> {
    View,
    Update { fields: &'a Map<String, JsonValue> },
    Delete,
    Restore { reason: Option<&'a str> },
}

impl UserOperation<'_> {
    pub fn action(&self) -> Action {
        match self {
            UserOperation::View => Action::View,
            UserOperation::Update { .. } => Action::Update,
            UserOperation::Delete => Action::Delete,
            UserOperation::Restore { .. } => Action::Restore,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gates (pure)
// ─────────────────────────────────────────────────────────────────────────────

/// Gate 1: target id format and request shape.
pub fn validate_request(
    raw_target_id: &str,
    op: &UserOperation<'_>,
    config: &PipelineConfig,
) -> Result<UserId, Denial> {
    let id = raw_target_id
        .parse::<UserId>()
        .map_err(|_| Denial::invalid_parameter("target id must be a UUID"))?;

    match op {
        UserOperation::Update { fields } if fields.is_empty() => {
            Err(Denial::invalid_parameter("no fields to update"))
        }
        UserOperation::Restore { reason: Some(reason) }
            if reason.chars().count() > config.restore_reason_max_len =>
        {
            Err(Denial::invalid_parameter(format!(
                "reason exceeds {} characters",
                config.restore_reason_max_len
            )))
        }
        _ => Ok(id),
    }
}

/// Gate 2: may this role attempt `action` at all?
pub fn check_role_gate(
    matrices: &PermissionMatrices,
    principal: &Principal,
    action: Action,
) -> Result<(), Denial> {
    if matrices.may_attempt(principal.role(), action) {
        Ok(())
    } else {
        Err(Denial::new(
            ErrorCode::UnauthorizedRole,
            format!("role {} is not permitted to {}", principal.role(), action),
        ))
    }
}

/// Gate 3: the target must exist. Soft-deleted rows only exist for RESTORE.
pub fn check_existence(action: Action, found: Option<UserRecord>) -> Result<UserRecord, Denial> {
    match found {
        Some(target) if action == Action::Restore || !target.is_deleted() => Ok(target),
        _ => Err(Denial::not_found()),
    }
}

/// Gate 4: non-SUPERADMIN principals stay inside their credential tenant.
pub fn check_tenant_scope(principal: &Principal, target: &UserRecord) -> Result<(), Denial> {
    if principal.is_superadmin() || target.tenant_id == principal.tenant_id() {
        return Ok(());
    }
    tracing::warn!(
        target: "storegate::security",
        principal_id = %principal.id(),
        principal_tenant = %principal.tenant_id(),
        target_tenant = %target.tenant_id,
        "cross-tenant access attempt"
    );
    Err(Denial::new(ErrorCode::CrossTenantAccess, "access denied"))
}

/// Gate 5. For UPDATE, returns the validated patch built only from allowed fields.
pub fn check_relationship(
    matrices: &PermissionMatrices,
    principal: &Principal,
    target: &UserRecord,
    op: &UserOperation<'_>,
) -> Result<Option<UserPatch>, Denial> {
    match op {
        UserOperation::View => Ok(None),
        UserOperation::Delete | UserOperation::Restore { .. } => {
            if matrices.may_delete(principal.role(), target.role) {
                Ok(None)
            } else {
                Err(Denial::new(
                    ErrorCode::RoleHierarchyViolation,
                    format!(
                        "role {} may not {} users with role {}",
                        principal.role(),
                        op.action(),
                        target.role
                    ),
                ))
            }
        }
        UserOperation::Update { fields } => {
            let partition =
                matrices.partition_fields(principal.role(), fields.keys().map(String::as_str));
            if !partition.is_clean() {
                let message = format!("fields not allowed: {}", partition.forbidden.join(", "));
                return Err(
                    Denial::new(ErrorCode::FieldNotAllowed, message).with_fields(partition.forbidden)
                );
            }
            let values = partition
                .allowed
                .iter()
                .filter_map(|f| fields.get(f.as_str()).map(|v| (*f, v)));
            let patch = UserPatch::from_values(values)
                .map_err(|e| Denial::invalid_parameter(e.to_string()))?;
            Ok(Some(patch))
        }
    }
}

/// Gate 6: nobody deletes themselves through this path.
pub fn check_self_action(principal: &Principal, target: &UserRecord, action: Action) -> Result<(), Denial> {
    if action == Action::Delete && target.id == principal.id() {
        Err(Denial::new(ErrorCode::SelfActionForbidden, "users cannot delete themselves"))
    } else {
        Ok(())
    }
}

/// Gate 7: only soft-deleted users can be restored.
pub fn check_state(target: &UserRecord, action: Action) -> Result<(), Denial> {
    if action == Action::Restore && !target.is_deleted() {
        Err(Denial::new(ErrorCode::NotDeleted, "user is not deleted"))
    } else {
        Ok(())
    }
}

/// Gates 4 to 7 against a fetched target.
pub fn evaluate_target(
    matrices: &PermissionMatrices,
    principal: &Principal,
    target: &UserRecord,
    op: &UserOperation<'_>,
) -> Result<Option<UserPatch>, Denial> {
    let action = op.action();
    check_tenant_scope(principal, target)?;
    let patch = check_relationship(matrices, principal, target, op)?;
    check_self_action(principal, target, action)?;
    check_state(target, action)?;
    Ok(patch)
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// The decision engine in front of every user-management operation.
///
/// Holds no per-request state; clone it freely across tasks.
#[derive(Clone)]
pub struct AuthorizationPipeline {
    directory: Arc<dyn UserDirectory>,
    mutator: Arc<dyn TransactionalMutator>,
    audit: Arc<dyn AuditSink>,
    matrices: Arc<PermissionMatrices>,
    sanitizer: ResponseSanitizer,
    config: PipelineConfig,
}

impl AuthorizationPipeline {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        mutator: Arc<dyn TransactionalMutator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            directory,
            mutator,
            audit,
            matrices: PermissionMatrices::reference(),
            sanitizer: ResponseSanitizer::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_matrices(mut self, matrices: Arc<PermissionMatrices>) -> Self {
        self.matrices = matrices;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn matrices(&self) -> &PermissionMatrices {
        &self.matrices
    }

    pub async fn view_user(&self, ctx: &RequestContext, identity: &BoundIdentity, target_id: &str) -> Decision {
        self.authorize(ctx, identity, target_id, UserOperation::View).await
    }

    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        identity: &BoundIdentity,
        target_id: &str,
        fields: &Map<String, JsonValue>,
    ) -> Decision {
        self.authorize(ctx, identity, target_id, UserOperation::Update { fields })
            .await
    }

    pub async fn delete_user(&self, ctx: &RequestContext, identity: &BoundIdentity, target_id: &str) -> Decision {
        self.authorize(ctx, identity, target_id, UserOperation::Delete).await
    }

    pub async fn restore_user(
        &self,
        ctx: &RequestContext,
        identity: &BoundIdentity,
        target_id: &str,
        reason: Option<&str>,
    ) -> Decision {
        self.authorize(ctx, identity, target_id, UserOperation::Restore { reason })
            .await
    }

    /// Run the full gate sequence for one request.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        identity: &BoundIdentity,
        raw_target_id: &str,
        op: UserOperation<'_>,
    ) -> Decision {
        let principal = identity.principal;
        let action = op.action();
        let span = tracing::info_span!(
            "authorize",
            request_id = %ctx.request_id(),
            action = %action,
            principal_id = %principal.id(),
            role = %principal.role(),
            target_id = raw_target_id,
        );

        async {
            let target_id = match validate_request(raw_target_id, &op, &self.config) {
                Ok(id) => id,
                Err(denial) => {
                    tracing::debug!(code = %denial.code, "request rejected before gate evaluation");
                    return Decision::from(denial);
                }
            };

            let mut event = AuditEvent::begin(ctx, &principal, action);
            event.target(target_id);
            if let UserOperation::Restore { reason } = op {
                event.reason(reason.unwrap_or(DEFAULT_RESTORE_REASON));
            }

            let decision = self
                .evaluate(ctx, &principal, target_id, &op, &mut event)
                .await
                .unwrap_or_else(Decision::from);

            log_decision(&decision);
            self.record(event.conclude(&decision)).await;
            decision
        }
        .instrument(span)
        .await
    }

    /// Users visible to the principal. SUPERADMIN honours its scope filter.
    pub async fn list_users(&self, ctx: &RequestContext, identity: &BoundIdentity, include_deleted: bool) -> Decision {
        let principal = identity.principal;
        let span = tracing::info_span!(
            "authorize",
            request_id = %ctx.request_id(),
            action = %Action::List,
            principal_id = %principal.id(),
            role = %principal.role(),
            target_id = tracing::field::Empty,
        );

        async {
            let mut event = AuditEvent::begin(ctx, &principal, Action::List);
            let decision = self
                .evaluate_list(identity, include_deleted, &mut event)
                .await
                .unwrap_or_else(Decision::from);

            log_decision(&decision);
            self.record(event.conclude(&decision)).await;
            decision
        }
        .instrument(span)
        .await
    }

    /// Read-only dump of the active matrices. SUPERADMIN only; not audited.
    pub fn explain_matrices(&self, identity: &BoundIdentity) -> Decision {
        if !identity.principal.is_superadmin() {
            return Denial::new(
                ErrorCode::UnauthorizedRole,
                format!("role {} may not inspect permission matrices", identity.principal.role()),
            )
            .into();
        }
        match serde_json::to_value(self.matrices.describe()) {
            Ok(body) => Decision::allow(body),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize permission matrices");
                Denial::transient(500, "temporary failure; retry the request").into()
            }
        }
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        principal: &Principal,
        target_id: UserId,
        op: &UserOperation<'_>,
        event: &mut AuditEvent,
    ) -> Result<Decision, Denial> {
        let action = op.action();

        check_role_gate(&self.matrices, principal, action)?;

        let found = self
            .directory
            .find_by_id(target_id)
            .await
            .map_err(store_failure)?;
        let target = check_existence(action, found)?;
        event.target_tenant(target.tenant_id);

        let patch = evaluate_target(&self.matrices, principal, &target, op)?;

        let at = Utc::now();
        let mutation = match op {
            UserOperation::View => return Ok(Decision::allow(self.sanitizer.user(&target))),
            UserOperation::Update { .. } => Mutation::Update {
                id: target.id,
                patch: patch.unwrap_or_default(),
                at,
            },
            UserOperation::Delete => Mutation::SoftDelete { id: target.id, at },
            UserOperation::Restore { .. } => Mutation::Restore { id: target.id, at },
        };

        let requested = match &mutation {
            Mutation::Update { patch, .. } => patch.fields(),
            _ => Vec::new(),
        };

        let MutationResult { before, after } = self.mutate(ctx, mutation).await?;

        if action == Action::Update {
            let changed: Vec<UserField> = requested
                .iter()
                .copied()
                .filter(|f| before.field_value(*f) != after.field_value(*f))
                .collect();
            event.changes(field_map(&before, &changed), field_map(&after, &changed));
            let applied = requested.iter().map(|f| f.as_str().to_string()).collect();
            Ok(Decision::allow(self.sanitizer.user(&after)).with_filtered_fields(applied))
        } else {
            event.changes(deleted_at_map(before.deleted_at), deleted_at_map(after.deleted_at));
            Ok(Decision::allow(self.sanitizer.user(&after)))
        }
    }

    async fn evaluate_list(
        &self,
        identity: &BoundIdentity,
        include_deleted: bool,
        event: &mut AuditEvent,
    ) -> Result<Decision, Denial> {
        let principal = &identity.principal;
        check_role_gate(&self.matrices, principal, Action::List)?;

        let tenant = if principal.is_superadmin() {
            identity.scope.tenant_id()
        } else {
            Some(principal.tenant_id())
        };
        if let Some(tenant) = tenant {
            event.target_tenant(tenant);
        }
        let include_deleted =
            include_deleted && self.matrices.may_attempt(principal.role(), Action::Restore);

        let users = self
            .directory
            .list(tenant, include_deleted)
            .await
            .map_err(store_failure)?;

        let visible: Vec<&UserRecord> = users
            .iter()
            .filter(|u| tenant.is_none_or(|t| u.tenant_id == t))
            .filter(|u| include_deleted || !u.is_deleted())
            .collect();

        Ok(Decision::allow(self.sanitizer.users(visible)))
    }

    /// Run a mutation inside the remaining request budget.
    ///
    /// The budget travels in [`TxOptions`] and the mutator enforces it up to its
    /// commit point. The call is never cancelled from here, so a commit that has
    /// started always reports its real outcome.
    async fn mutate(&self, ctx: &RequestContext, mutation: Mutation) -> Result<MutationResult, Denial> {
        let budget = ctx
            .remaining()
            .map_or(self.config.mutation_timeout, |left| left.min(self.config.mutation_timeout));
        if budget.is_zero() {
            tracing::warn!("request deadline exhausted before mutation");
            return Err(Denial::transient(503, "request deadline exceeded; retry the request"));
        }

        let opts = TxOptions {
            isolation: mutation.isolation(),
            timeout: budget,
        };

        tracing::debug!(
            budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            isolation = opts.isolation.as_sql(),
            "running mutation"
        );
        self.mutator
            .mutate(mutation, opts)
            .await
            .map_err(mutation_failure)
    }

    /// Hand the event to the sink on its own task. The decision waits at most
    /// `audit_grace`; a slower sink finishes in the background.
    async fn record(&self, event: AuditEvent) {
        let event_id = event.event_id;
        let sink = Arc::clone(&self.audit);
        let delivery = tokio::spawn(
            async move {
                if let Err(err) = sink.emit(event).await {
                    tracing::error!(target: "storegate::audit", %event_id, error = %err, "audit emission failed");
                }
            }
            .in_current_span(),
        );

        match tokio::time::timeout(self.config.audit_grace, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(target: "storegate::audit", %event_id, error = %err, "audit delivery task failed");
            }
            Err(_) => {
                tracing::warn!(
                    target: "storegate::audit",
                    %event_id,
                    "audit sink is slow; delivery continues in the background"
                );
            }
        }
    }
}

fn log_decision(decision: &Decision) {
    match decision.error_code {
        None => tracing::info!(status = decision.http_status, "allowed"),
        Some(code) => tracing::info!(status = decision.http_status, code = %code, "denied"),
    }
}

fn store_failure(err: StoreError) -> Denial {
    tracing::error!(error = %err, "user lookup failed");
    match err {
        StoreError::Unavailable(_) => Denial::transient(503, "service temporarily unavailable; retry the request"),
        StoreError::Backend(_) => Denial::transient(500, "temporary failure; retry the request"),
    }
}

fn mutation_failure(err: MutationError) -> Denial {
    match err {
        MutationError::NotFound => Denial::not_found(),
        MutationError::NotDeleted => Denial::new(ErrorCode::NotDeleted, "user is not deleted"),
        MutationError::Timeout => {
            tracing::warn!("mutation transaction timed out");
            Denial::transient(503, "operation timed out; retry the request")
        }
        MutationError::Unavailable(detail) => {
            tracing::error!(%detail, "mutation backend unavailable");
            Denial::transient(503, "service temporarily unavailable; retry the request")
        }
        MutationError::Conflict(detail) => {
            tracing::warn!(%detail, "mutation transaction conflict");
            Denial::transient(503, "concurrent modification; retry the request")
        }
        MutationError::Backend(detail) => {
            tracing::error!(%detail, "mutation failed");
            Denial::transient(500, "temporary failure; retry the request")
        }
    }
}

fn field_map(user: &UserRecord, fields: &[UserField]) -> Map<String, JsonValue> {
    fields
        .iter()
        .map(|f| (f.as_str().to_string(), user.field_value(*f)))
        .collect()
}

fn deleted_at_map(deleted_at: Option<DateTime<Utc>>) -> Map<String, JsonValue> {
    let value = deleted_at.map_or(JsonValue::Null, |t| JsonValue::String(t.to_rfc3339()));
    let mut map = Map::new();
    map.insert("deletedAt".to_string(), value);
    map
}
