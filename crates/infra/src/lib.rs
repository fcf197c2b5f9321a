//! Infrastructure layer: the storage collaborators behind the authorization pipeline.
//!
//! In-memory implementations back dev mode and tests; Postgres implementations
//! back production.

pub mod audit_log;
pub mod users;

pub use audit_log::{InMemoryAuditLog, PostgresAuditLog};
pub use users::{InMemoryUserStore, PostgresUserStore};
