//! `storegate-core`: identifiers and errors shared by every storegate crate.
//!
//! Nothing here performs IO.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{TenantId, UserId};
