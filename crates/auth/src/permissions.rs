//! Static permission matrices.
//!
//! The tables are plain data so they can be enumerated directly by tests and
//! operators. The reference tables are built once per process and are never
//! mutated afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use storegate_core::{DomainError, DomainResult};

use crate::Role;

/// Operation a principal may attempt against a user resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    View,
    Update,
    Delete,
    Restore,
    List,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::View,
        Action::Update,
        Action::Delete,
        Action::Restore,
        Action::List,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "VIEW",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Restore => "RESTORE",
            Action::List => "LIST",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writable user field, named as it appears on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserField {
    FirstName,
    LastName,
    Email,
    IsActive,
    Role,
}

impl UserField {
    pub const ALL: [UserField; 5] = [
        UserField::FirstName,
        UserField::LastName,
        UserField::Email,
        UserField::IsActive,
        UserField::Role,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserField::FirstName => "firstName",
            UserField::LastName => "lastName",
            UserField::Email => "email",
            UserField::IsActive => "isActive",
            UserField::Role => "role",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        UserField::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl core::fmt::Display for UserField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of splitting requested update fields against a role's field set.
///
/// `forbidden` keeps raw names so unknown fields can be reported back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPartition {
    pub allowed: Vec<UserField>,
    pub forbidden: Vec<String>,
}

impl FieldPartition {
    pub fn is_clean(&self) -> bool {
        self.forbidden.is_empty()
    }
}

/// A place where a lower-ranked role holds a grant its superior lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonotonicityViolation {
    pub table: &'static str,
    pub higher: Role,
    pub lower: Role,
    pub entry: String,
}

impl core::fmt::Display for MonotonicityViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {} grants '{}' but {} does not",
            self.table, self.lower, self.entry, self.higher
        )
    }
}

/// Serializable view of one role's row across all tables.
#[derive(Debug, Clone, Serialize)]
pub struct RoleGrants {
    pub role: Role,
    pub rank: u8,
    pub actions: Vec<Action>,
    pub deletable_roles: Vec<Role>,
    pub writable_fields: Vec<UserField>,
}

/// Action, deletion and field matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrices {
    action_roles: HashMap<Action, HashSet<Role>>,
    deletion: HashMap<Role, HashSet<Role>>,
    fields: HashMap<Role, HashSet<UserField>>,
}

static REFERENCE: LazyLock<Arc<PermissionMatrices>> = LazyLock::new(|| {
    use Action::*;
    use Role::*;

    Arc::new(PermissionMatrices::from_tables(
        &[
            (View, &[SuperAdmin, Operador, ClienteAdmin, ClienteUser]),
            (List, &[SuperAdmin, Operador, ClienteAdmin]),
            (Update, &[SuperAdmin, Operador, ClienteAdmin]),
            (Delete, &[SuperAdmin, Operador, ClienteAdmin]),
            (Restore, &[SuperAdmin, Operador, ClienteAdmin]),
        ],
        &[
            (SuperAdmin, &[SuperAdmin, Operador, ClienteAdmin, ClienteUser]),
            (Operador, &[ClienteAdmin, ClienteUser]),
            (ClienteAdmin, &[ClienteUser]),
            (ClienteUser, &[]),
        ],
        &[
            (
                SuperAdmin,
                &[
                    UserField::FirstName,
                    UserField::LastName,
                    UserField::Email,
                    UserField::IsActive,
                    UserField::Role,
                ],
            ),
            (
                Operador,
                &[
                    UserField::FirstName,
                    UserField::LastName,
                    UserField::Email,
                    UserField::IsActive,
                ],
            ),
            (
                ClienteAdmin,
                &[UserField::FirstName, UserField::LastName, UserField::Email],
            ),
            (ClienteUser, &[]),
        ],
    ))
});

impl PermissionMatrices {
    /// The reference configuration shared by the whole process.
    pub fn reference() -> Arc<PermissionMatrices> {
        REFERENCE.clone()
    }

    /// Build matrices from literal tables. Roles missing from a table get an empty row.
    pub fn from_tables(
        action_roles: &[(Action, &[Role])],
        deletion: &[(Role, &[Role])],
        fields: &[(Role, &[UserField])],
    ) -> Self {
        Self {
            action_roles: action_roles
                .iter()
                .map(|(a, roles)| (*a, roles.iter().copied().collect()))
                .collect(),
            deletion: deletion
                .iter()
                .map(|(r, targets)| (*r, targets.iter().copied().collect()))
                .collect(),
            fields: fields
                .iter()
                .map(|(r, fs)| (*r, fs.iter().copied().collect()))
                .collect(),
        }
    }

    /// Coarse gate: may `role` attempt `action` at all, regardless of target?
    pub fn may_attempt(&self, role: Role, action: Action) -> bool {
        self.action_roles
            .get(&action)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// May `actor` delete or restore a user holding `target`?
    pub fn may_delete(&self, actor: Role, target: Role) -> bool {
        self.deletion
            .get(&actor)
            .is_some_and(|targets| targets.contains(&target))
    }

    pub fn may_write(&self, actor: Role, field: UserField) -> bool {
        self.fields
            .get(&actor)
            .is_some_and(|fields| fields.contains(&field))
    }

    /// Target roles `actor` may delete/restore, highest rank first.
    pub fn deletable_roles(&self, actor: Role) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|target| self.may_delete(actor, *target))
            .collect()
    }

    pub fn writable_fields(&self, actor: Role) -> Vec<UserField> {
        UserField::ALL
            .into_iter()
            .filter(|field| self.may_write(actor, *field))
            .collect()
    }

    /// Split raw requested field names into allowed and forbidden.
    ///
    /// Names outside the field schema are always forbidden. Both halves come
    /// back sorted and deduplicated.
    pub fn partition_fields<'a, I>(&self, actor: Role, requested: I) -> FieldPartition
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut partition = FieldPartition::default();
        for name in requested {
            match UserField::from_name(name) {
                Some(field) if self.may_write(actor, field) => partition.allowed.push(field),
                _ => partition.forbidden.push(name.to_string()),
            }
        }
        partition.allowed.sort();
        partition.allowed.dedup();
        partition.forbidden.sort();
        partition.forbidden.dedup();
        partition
    }

    /// Every grant held by a lower-ranked role but missing from a higher one.
    pub fn monotonicity_violations(&self) -> Vec<MonotonicityViolation> {
        let mut violations = Vec::new();

        for higher in Role::ALL {
            for lower in Role::ALL.into_iter().filter(|r| higher.is_strictly_higher(*r)) {
                for action in Action::ALL {
                    if self.may_attempt(lower, action) && !self.may_attempt(higher, action) {
                        violations.push(MonotonicityViolation {
                            table: "actions",
                            higher,
                            lower,
                            entry: action.as_str().to_string(),
                        });
                    }
                }
                for target in Role::ALL {
                    if self.may_delete(lower, target) && !self.may_delete(higher, target) {
                        violations.push(MonotonicityViolation {
                            table: "deletion",
                            higher,
                            lower,
                            entry: target.as_str().to_string(),
                        });
                    }
                }
                for field in UserField::ALL {
                    if self.may_write(lower, field) && !self.may_write(higher, field) {
                        violations.push(MonotonicityViolation {
                            table: "fields",
                            higher,
                            lower,
                            entry: field.as_str().to_string(),
                        });
                    }
                }
            }
        }

        violations
    }

    pub fn ensure_monotonic(&self) -> DomainResult<()> {
        let violations = self.monotonicity_violations();
        if violations.is_empty() {
            return Ok(());
        }
        let detail: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        Err(DomainError::invariant(format!(
            "permission matrices are not monotonic: {}",
            detail.join("; ")
        )))
    }

    /// One row per role, for operator inspection.
    pub fn describe(&self) -> Vec<RoleGrants> {
        Role::ALL
            .into_iter()
            .map(|role| RoleGrants {
                role,
                rank: role.rank(),
                actions: Action::ALL
                    .into_iter()
                    .filter(|a| self.may_attempt(role, *a))
                    .collect(),
                deletable_roles: self.deletable_roles(role),
                writable_fields: self.writable_fields(role),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn deletion_matrix_matches_reference() {
        let m = PermissionMatrices::reference();
        assert_eq!(m.deletable_roles(Role::SuperAdmin), Role::ALL.to_vec());
        assert_eq!(
            m.deletable_roles(Role::Operador),
            vec![Role::ClienteAdmin, Role::ClienteUser]
        );
        assert_eq!(m.deletable_roles(Role::ClienteAdmin), vec![Role::ClienteUser]);
        assert!(m.deletable_roles(Role::ClienteUser).is_empty());
    }

    #[test]
    fn field_matrix_matches_reference() {
        use UserField as F;
        let m = PermissionMatrices::reference();
        assert_eq!(
            m.writable_fields(Role::SuperAdmin),
            vec![F::FirstName, F::LastName, F::Email, F::IsActive, F::Role]
        );
        assert_eq!(
            m.writable_fields(Role::Operador),
            vec![F::FirstName, F::LastName, F::Email, F::IsActive]
        );
        assert_eq!(
            m.writable_fields(Role::ClienteAdmin),
            vec![F::FirstName, F::LastName, F::Email]
        );
        assert!(m.writable_fields(Role::ClienteUser).is_empty());
    }

    #[test]
    fn cliente_user_may_only_view() {
        let m = PermissionMatrices::reference();
        for action in Action::ALL {
            assert_eq!(
                m.may_attempt(Role::ClienteUser, action),
                action == Action::View,
                "{action}"
            );
        }
    }

    #[test]
    fn partition_reports_forbidden_and_unknown_names() {
        let m = PermissionMatrices::reference();
        let p = m.partition_fields(Role::Operador, ["firstName", "role", "passwordHash"]);
        assert_eq!(p.allowed, vec![UserField::FirstName]);
        assert_eq!(p.forbidden, vec!["passwordHash".to_string(), "role".to_string()]);
        assert!(!p.is_clean());
    }

    #[test]
    fn reference_tables_are_monotonic() {
        let m = PermissionMatrices::reference();
        assert!(m.monotonicity_violations().is_empty());
        assert!(m.ensure_monotonic().is_ok());
    }

    #[test]
    fn non_monotonic_tables_are_reported() {
        let m = PermissionMatrices::from_tables(
            &[(Action::View, &[Role::ClienteUser])],
            &[],
            &[(Role::ClienteAdmin, &[UserField::Role])],
        );
        let violations = m.monotonicity_violations();
        assert!(violations.iter().any(|v| v.table == "fields"
            && v.lower == Role::ClienteAdmin
            && v.higher == Role::Operador
            && v.entry == "role"));
        assert!(violations.iter().any(|v| v.table == "actions" && v.entry == "VIEW"));
        assert!(matches!(
            m.ensure_monotonic(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn describe_lists_every_role() {
        let rows = PermissionMatrices::reference().describe();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].role, Role::SuperAdmin);
        assert_eq!(rows[3].actions, vec![Action::View]);
    }

    proptest! {
        /// Any request either splits cleanly or names every field outside the role's set.
        #[test]
        fn partition_is_exact(
            role_idx in 0usize..4,
            picks in prop::collection::vec(0usize..7, 0..8)
        ) {
            let names = ["firstName", "lastName", "email", "isActive", "role", "password", "tenantId"];
            let role = Role::ALL[role_idx];
            let m = PermissionMatrices::reference();
            let requested: Vec<&str> = picks.iter().map(|i| names[*i]).collect();
            let p = m.partition_fields(role, requested.iter().copied());

            for name in &requested {
                let writable = UserField::from_name(name).is_some_and(|f| m.may_write(role, f));
                prop_assert_eq!(writable, p.allowed.iter().any(|f| f.as_str() == *name));
                prop_assert_eq!(!writable, p.forbidden.iter().any(|f| f == name));
            }
        }
    }
}
