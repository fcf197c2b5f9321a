use storegate_auth::{BoundIdentity, Principal, RequestContext, TenantScope};

/// Per-request caller context, inserted by the auth middleware.
///
/// Immutable and present on every protected route. Handlers never read the
/// tenant header themselves; the binding decision is already in `identity`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    identity: BoundIdentity,
    request: RequestContext,
}

impl CallerContext {
    pub fn new(identity: BoundIdentity, request: RequestContext) -> Self {
        Self { identity, request }
    }

    pub fn identity(&self) -> &BoundIdentity {
        &self.identity
    }

    pub fn principal(&self) -> &Principal {
        &self.identity.principal
    }

    pub fn scope(&self) -> TenantScope {
        self.identity.scope
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }
}
