//! Append-only audit log sinks.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAuditLog;
pub use postgres::{AUDIT_SCHEMA, PostgresAuditLog};
