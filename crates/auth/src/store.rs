//! Collaborator seams: data access and transactional mutation.
//!
//! The pipeline owns no storage. It reads through [`UserDirectory`] and changes
//! state only through [`TransactionalMutator`], which must re-check the
//! precondition of each mutation inside its own transaction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use storegate_core::{TenantId, UserId};

use crate::{UserPatch, UserRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Tenant-agnostic read access to user rows.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a row by id, soft-deleted rows included.
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Rows in `tenant` (all tenants when `None`), ordered by creation time.
    async fn list(
        &self,
        tenant: Option<TenantId>,
        include_deleted: bool,
    ) -> Result<Vec<UserRecord>, StoreError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IsolationLevel {
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Guarantees the pipeline requests for a single mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub timeout: Duration,
}

/// A state change, already authorized.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Apply only the permitted, validated fields.
    Update {
        id: UserId,
        patch: UserPatch,
        at: DateTime<Utc>,
    },
    SoftDelete { id: UserId, at: DateTime<Utc> },
    Restore { id: UserId, at: DateTime<Utc> },
}

impl Mutation {
    pub fn target(&self) -> UserId {
        match self {
            Mutation::Update { id, .. } | Mutation::SoftDelete { id, .. } | Mutation::Restore { id, .. } => *id,
        }
    }

    pub fn isolation(&self) -> IsolationLevel {
        match self {
            Mutation::Update { .. } => IsolationLevel::RepeatableRead,
            Mutation::SoftDelete { .. } | Mutation::Restore { .. } => IsolationLevel::Serializable,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Row vanished, or was soft-deleted, between evaluation and commit.
    #[error("target not found")]
    NotFound,

    /// Restore found the row already active inside the transaction.
    #[error("target is not deleted")]
    NotDeleted,

    #[error("transaction timed out")]
    Timeout,

    /// The backend could not be reached; nothing was attempted.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization failure or lock conflict; the whole request may be retried.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Row state on both sides of a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub before: UserRecord,
    pub after: UserRecord,
}

#[async_trait::async_trait]
pub trait TransactionalMutator: Send + Sync {
    /// Run `mutation` in one transaction under `opts`.
    ///
    /// Implementations must re-read the row inside the transaction and fail with
    /// `NotFound` / `NotDeleted` when the precondition no longer holds.
    ///
    /// `opts.timeout` bounds the work before the commit point: once it elapses
    /// the transaction is rolled back and `Timeout` returned. A commit that has
    /// started runs to completion and reports its real outcome.
    async fn mutate(&self, mutation: Mutation, opts: TxOptions) -> Result<MutationResult, MutationError>;
}
