//! The user row the engine guards, and the typed patch an update may apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use storegate_core::{DomainError, DomainResult, TenantId, UserId};

use crate::{Role, UserField};

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;

/// A managed user account.
///
/// `deleted_at == None` means the row exists actively; `Some` means it is
/// soft-deleted. Rows are never hard-removed here. Upstream may attach more
/// columns than this model names (credential hashes, tokens, ...); those land in
/// `extra` and are dropped by the response sanitizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl UserRecord {
    pub fn new(
        tenant_id: TenantId,
        role: Role,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            tenant_id,
            role,
            is_active: true,
            deleted_at: None,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            created_at: now,
            updated_at: now,
            password_hash: None,
            extra: Map::new(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn field_value(&self, field: UserField) -> JsonValue {
        match field {
            UserField::FirstName => JsonValue::from(self.first_name.clone()),
            UserField::LastName => JsonValue::from(self.last_name.clone()),
            UserField::Email => JsonValue::from(self.email.clone()),
            UserField::IsActive => JsonValue::from(self.is_active),
            UserField::Role => JsonValue::from(self.role.as_str()),
        }
    }

    /// Apply a patch in place. Returns the fields whose value actually changed.
    pub fn apply_patch(&mut self, patch: &UserPatch, at: DateTime<Utc>) -> Vec<UserField> {
        let mut changed = Vec::new();

        if let Some(v) = &patch.first_name {
            if *v != self.first_name {
                self.first_name = v.clone();
                changed.push(UserField::FirstName);
            }
        }
        if let Some(v) = &patch.last_name {
            if *v != self.last_name {
                self.last_name = v.clone();
                changed.push(UserField::LastName);
            }
        }
        if let Some(v) = &patch.email {
            if *v != self.email {
                self.email = v.clone();
                changed.push(UserField::Email);
            }
        }
        if let Some(v) = patch.is_active {
            if v != self.is_active {
                self.is_active = v;
                changed.push(UserField::IsActive);
            }
        }
        if let Some(v) = patch.role {
            if v != self.role {
                self.role = v;
                changed.push(UserField::Role);
            }
        }

        if !changed.is_empty() {
            self.updated_at = at;
        }
        changed
    }
}

/// Typed, validated update built only from fields that passed the field matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

impl UserPatch {
    /// Build a patch from `(field, raw value)` pairs, validating each value.
    pub fn from_values<'a, I>(values: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (UserField, &'a JsonValue)>,
    {
        let mut patch = UserPatch::default();
        for (field, value) in values {
            match field {
                UserField::FirstName => patch.first_name = Some(name_value(field, value)?),
                UserField::LastName => patch.last_name = Some(name_value(field, value)?),
                UserField::Email => patch.email = Some(email_value(value)?),
                UserField::IsActive => {
                    patch.is_active = Some(value.as_bool().ok_or_else(|| {
                        DomainError::validation("isActive must be a boolean")
                    })?)
                }
                UserField::Role => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| DomainError::validation("role must be a string"))?;
                    patch.role = Some(
                        raw.parse::<Role>()
                            .map_err(|e| DomainError::validation(e.to_string()))?,
                    );
                }
            }
        }
        Ok(patch)
    }

    pub fn fields(&self) -> Vec<UserField> {
        let mut out = Vec::new();
        if self.first_name.is_some() {
            out.push(UserField::FirstName);
        }
        if self.last_name.is_some() {
            out.push(UserField::LastName);
        }
        if self.email.is_some() {
            out.push(UserField::Email);
        }
        if self.is_active.is_some() {
            out.push(UserField::IsActive);
        }
        if self.role.is_some() {
            out.push(UserField::Role);
        }
        out
    }
}

fn name_value(field: UserField, value: &JsonValue) -> DomainResult<String> {
    let s = value
        .as_str()
        .ok_or_else(|| DomainError::validation(format!("{field} must be a string")))?
        .trim();
    if s.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    if s.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{field} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(s.to_string())
}

fn email_value(value: &JsonValue) -> DomainResult<String> {
    let s = value
        .as_str()
        .ok_or_else(|| DomainError::validation("email must be a string"))?
        .trim()
        .to_lowercase();
    let valid = s.len() <= MAX_EMAIL_LEN
        && s.split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(DomainError::validation("invalid email format"));
    }
    Ok(s)
}
