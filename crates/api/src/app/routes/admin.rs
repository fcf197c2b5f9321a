//! Operator endpoints.

use std::sync::Arc;

use axum::{Router, extract::Extension, routing::get};

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/permissions", get(explain_permissions))
}

/// Read-only dump of the active permission matrices (SUPERADMIN only).
pub async fn explain_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    errors::decision_response(services.pipeline.explain_matrices(caller.identity()))
}
