use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::dto::WhoAmIResponse;
use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The bound principal as the pipeline will see it. Not audited.
pub async fn whoami(Extension(caller): Extension<CallerContext>) -> impl IntoResponse {
    Json(WhoAmIResponse::from(&caller))
}
