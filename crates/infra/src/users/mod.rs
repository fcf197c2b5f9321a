//! User row storage: the directory and transactional mutator the pipeline reads
//! and writes through.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryUserStore;
pub use postgres::{PostgresUserStore, USERS_SCHEMA};

use storegate_auth::{Mutation, MutationError, UserRecord};

/// Compute the row that `mutation` produces from `current`.
///
/// Both stores call this inside their transaction, after re-reading the row, so
/// the precondition is always checked against committed state.
pub fn apply_mutation(current: &UserRecord, mutation: &Mutation) -> Result<UserRecord, MutationError> {
    let mut next = current.clone();
    match mutation {
        Mutation::Update { patch, at, .. } => {
            if current.is_deleted() {
                return Err(MutationError::NotFound);
            }
            next.apply_patch(patch, *at);
        }
        Mutation::SoftDelete { at, .. } => {
            if current.is_deleted() {
                return Err(MutationError::NotFound);
            }
            next.deleted_at = Some(*at);
            next.updated_at = *at;
        }
        Mutation::Restore { at, .. } => {
            if !current.is_deleted() {
                return Err(MutationError::NotDeleted);
            }
            next.deleted_at = None;
            next.updated_at = *at;
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storegate_auth::{Role, UserPatch};
    use storegate_core::TenantId;

    #[test]
    fn preconditions_are_checked_against_current_state() {
        let active = UserRecord::new(TenantId::new(), Role::ClienteUser, "a@b.io", "A", "B");
        let now = Utc::now();

        assert_eq!(
            apply_mutation(&active, &Mutation::Restore { id: active.id, at: now }),
            Err(MutationError::NotDeleted)
        );

        let deleted = apply_mutation(&active, &Mutation::SoftDelete { id: active.id, at: now }).unwrap();
        assert_eq!(deleted.deleted_at, Some(now));
        assert_eq!(
            apply_mutation(&deleted, &Mutation::SoftDelete { id: active.id, at: now }),
            Err(MutationError::NotFound)
        );
        let patch = UserPatch {
            first_name: Some("Z".to_string()),
            ..Default::default()
        };
        assert_eq!(
            apply_mutation(&deleted, &Mutation::Update { id: active.id, patch, at: now }),
            Err(MutationError::NotFound)
        );

        let restored = apply_mutation(&deleted, &Mutation::Restore { id: active.id, at: now }).unwrap();
        assert!(!restored.is_deleted());
    }
}
