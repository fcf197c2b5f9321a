//! `storegate-auth`: authorization and tenant-isolation decision engine.
//!
//! Decoupled from HTTP and storage: identity binding and every gate are pure,
//! and the only I/O goes through the collaborator traits in [`store`] and
//! [`audit`].

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod context;
pub mod decision;
pub mod identity;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod sanitize;
pub mod store;
pub mod user;

pub use audit::{AuditError, AuditEvent, AuditOutcome, AuditSink, mask_email};
pub use authorize::{AuthorizationPipeline, PipelineConfig, UserOperation};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use context::RequestContext;
pub use decision::{Decision, Denial, ErrorCode};
pub use identity::{BindingError, IdentityBinder};
pub use permissions::{Action, FieldPartition, MonotonicityViolation, PermissionMatrices, RoleGrants, UserField};
pub use principal::{BoundIdentity, Principal, TenantScope};
pub use roles::{Role, UnknownRole};
pub use sanitize::ResponseSanitizer;
pub use store::{
    IsolationLevel, Mutation, MutationError, MutationResult, StoreError, TransactionalMutator, TxOptions,
    UserDirectory,
};
pub use user::{UserPatch, UserRecord};
