//! Audit evidence emitted by the pipeline.
//!
//! Events are write-once. Payloads are masked when they are attached, so no
//! sink ever sees a raw email address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

use storegate_core::{TenantId, UserId};

use crate::context::RequestContext;
use crate::decision::{Decision, ErrorCode};
use crate::{Action, Principal, Role};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Allow,
    Deny,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Allow => "ALLOW",
            AuditOutcome::Deny => "DENY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub request_id: Uuid,
    pub action: Action,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub actor_tenant_id: TenantId,
    pub target_id: Option<UserId>,
    pub target_tenant_id: Option<TenantId>,
    pub outcome: AuditOutcome,
    pub error_code: Option<ErrorCode>,
    pub reason: Option<String>,
    pub old_values: Option<Map<String, JsonValue>>,
    pub new_values: Option<Map<String, JsonValue>>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Start an event for `action`. Outcome defaults to DENY until a decision is attached.
    pub fn begin(ctx: &RequestContext, principal: &Principal, action: Action) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            request_id: ctx.request_id(),
            action,
            actor_id: principal.id(),
            actor_role: principal.role(),
            actor_tenant_id: principal.tenant_id(),
            target_id: None,
            target_tenant_id: None,
            outcome: AuditOutcome::Deny,
            error_code: None,
            reason: None,
            old_values: None,
            new_values: None,
            timestamp: Utc::now(),
        }
    }

    pub fn target(&mut self, target_id: UserId) {
        self.target_id = Some(target_id);
    }

    pub fn target_tenant(&mut self, tenant_id: TenantId) {
        self.target_tenant_id = Some(tenant_id);
    }

    /// Record a state transition. Email-like values are masked here.
    pub fn changes(&mut self, mut old: Map<String, JsonValue>, mut new: Map<String, JsonValue>) {
        mask_payload(&mut old);
        mask_payload(&mut new);
        self.old_values = Some(old);
        self.new_values = Some(new);
    }

    pub fn reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Seal the event with the final decision.
    pub fn conclude(mut self, decision: &Decision) -> Self {
        if decision.allowed {
            self.outcome = AuditOutcome::Allow;
        } else {
            self.outcome = AuditOutcome::Deny;
            self.error_code = decision.error_code;
            if self.reason.is_none() {
                self.reason = decision.message.clone();
            }
        }
        self.timestamp = Utc::now();
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit write failed: {0}")]
    Write(String),
}

/// Append-only audit log.
///
/// Emission is best effort: the pipeline logs and swallows any error.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Mask an email address, keeping the first character and the domain.
///
/// `"alice@example.com"` becomes `"a***@example.com"`. Anything that is not
/// address-shaped is fully masked.
pub fn mask_email(value: &str) -> String {
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

/// Mask every string value stored under an email-like key, recursively.
pub fn mask_payload(map: &mut Map<String, JsonValue>) {
    for (key, value) in map.iter_mut() {
        match value {
            JsonValue::String(s) if key.to_ascii_lowercase().contains("email") => {
                *s = mask_email(s);
            }
            JsonValue::Object(inner) => mask_payload(inner),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_email_addresses() {
        assert_eq!(mask_email("alice@example.com"), "a***@example.com");
        assert_eq!(mask_email("@example.com"), "***");
        assert_eq!(mask_email("plain"), "***");
    }

    #[test]
    fn masks_nested_email_keys_only() {
        let mut payload = json!({
            "email": "bob@shop.test",
            "firstName": "Bob",
            "contact": { "backupEmail": "bob2@shop.test" }
        })
        .as_object()
        .cloned()
        .unwrap();
        mask_payload(&mut payload);
        assert_eq!(payload["email"], "b***@shop.test");
        assert_eq!(payload["firstName"], "Bob");
        assert_eq!(payload["contact"]["backupEmail"], "b***@shop.test");
    }

    #[test]
    fn conclude_mirrors_decision() {
        let ctx = RequestContext::new();
        let p = Principal::new(UserId::new(), Role::Operador, TenantId::new());

        let allowed = AuditEvent::begin(&ctx, &p, Action::View)
            .conclude(&Decision::allow(json!({})));
        assert_eq!(allowed.outcome, AuditOutcome::Allow);
        assert!(allowed.error_code.is_none());

        let denied = AuditEvent::begin(&ctx, &p, Action::Delete).conclude(&Decision::from(
            crate::decision::Denial::new(ErrorCode::RoleHierarchyViolation, "no"),
        ));
        assert_eq!(denied.outcome, AuditOutcome::Deny);
        assert_eq!(denied.error_code, Some(ErrorCode::RoleHierarchyViolation));
        assert_eq!(denied.reason.as_deref(), Some("no"));
        assert_eq!(denied.request_id, ctx.request_id());
    }
}
