//! Decision values and the stable error taxonomy.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Stable, machine-readable failure code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParameter,
    Unauthenticated,
    TenantBindingFailed,
    UnauthorizedRole,
    NotFound,
    CrossTenantAccess,
    RoleHierarchyViolation,
    FieldNotAllowed,
    SelfActionForbidden,
    NotDeleted,
    TransientFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::TenantBindingFailed => "TENANT_BINDING_FAILED",
            ErrorCode::UnauthorizedRole => "UNAUTHORIZED_ROLE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::CrossTenantAccess => "CROSS_TENANT_ACCESS",
            ErrorCode::RoleHierarchyViolation => "ROLE_HIERARCHY_VIOLATION",
            ErrorCode::FieldNotAllowed => "FIELD_NOT_ALLOWED",
            ErrorCode::SelfActionForbidden => "SELF_ACTION_FORBIDDEN",
            ErrorCode::NotDeleted => "NOT_DELETED",
            ErrorCode::TransientFailure => "TRANSIENT_FAILURE",
        }
    }

    pub fn status(self) -> u16 {
        match self {
            ErrorCode::InvalidParameter
            | ErrorCode::SelfActionForbidden
            | ErrorCode::NotDeleted => 400,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::TenantBindingFailed
            | ErrorCode::UnauthorizedRole
            | ErrorCode::CrossTenantAccess
            | ErrorCode::RoleHierarchyViolation
            | ErrorCode::FieldNotAllowed => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::TransientFailure => 503,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal gate failure, before it becomes a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
    pub fields: Option<Vec<String>>,
}

impl Denial {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: code.status(),
            message: message.into(),
            fields: None,
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "user not found")
    }

    /// Retryable failure. `status` is 503 for timeouts/conflicts, 500 otherwise.
    pub fn transient(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::new(ErrorCode::TransientFailure, message)
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Outcome handed back to the transport layer. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Forbidden field names on `FIELD_NOT_ALLOWED`, applied field names on a successful update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_fields: Option<Vec<String>>,
    /// Sanitized resource (or list) on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
}

impl Decision {
    pub fn allow(body: JsonValue) -> Self {
        Self {
            allowed: true,
            http_status: 200,
            error_code: None,
            message: None,
            filtered_fields: None,
            body: Some(body),
        }
    }

    pub fn with_filtered_fields(mut self, fields: Vec<String>) -> Self {
        self.filtered_fields = Some(fields);
        self
    }

    pub fn is_denied_with(&self, code: ErrorCode) -> bool {
        !self.allowed && self.error_code == Some(code)
    }
}

impl From<Denial> for Decision {
    fn from(denial: Denial) -> Self {
        Self {
            allowed: false,
            http_status: denial.status,
            error_code: Some(denial.code),
            message: Some(denial.message),
            filtered_fields: denial.fields,
            body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_tenant_has_same_status_as_role_denial() {
        assert_eq!(
            ErrorCode::CrossTenantAccess.status(),
            ErrorCode::UnauthorizedRole.status()
        );
    }

    #[test]
    fn denial_converts_to_closed_decision() {
        let d: Decision = Denial::new(ErrorCode::FieldNotAllowed, "nope")
            .with_fields(vec!["role".to_string()])
            .into();
        assert!(!d.allowed);
        assert_eq!(d.http_status, 403);
        assert!(d.body.is_none());
        assert_eq!(d.filtered_fields, Some(vec!["role".to_string()]));
        assert!(d.is_denied_with(ErrorCode::FieldNotAllowed));
    }

    #[test]
    fn transient_keeps_requested_status() {
        let d: Decision = Denial::transient(500, "backend").into();
        assert_eq!(d.http_status, 500);
        assert_eq!(d.error_code, Some(ErrorCode::TransientFailure));
    }

    #[test]
    fn codes_serialize_as_wire_names() {
        for code in [ErrorCode::NotDeleted, ErrorCode::CrossTenantAccess] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, JsonValue::String(code.as_str().to_string()));
        }
    }
}
