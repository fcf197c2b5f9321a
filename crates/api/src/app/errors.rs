use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value as JsonValue, json};

use storegate_auth::{BindingError, Decision, Denial, ErrorCode};

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Render a pipeline decision: the sanitized body on success, the error envelope otherwise.
pub fn decision_response(decision: Decision) -> axum::response::Response {
    let status = StatusCode::from_u16(decision.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if decision.allowed {
        return (status, axum::Json(decision.body.unwrap_or(JsonValue::Null))).into_response();
    }

    let code = decision.error_code.unwrap_or(ErrorCode::TransientFailure);
    let mut body = json!({
        "error": code.as_str(),
        "message": decision.message.unwrap_or_default(),
    });
    if let Some(fields) = decision.filtered_fields {
        body["fields"] = json!(fields);
    }
    (status, axum::Json(body)).into_response()
}

pub fn denial_response(denial: Denial) -> axum::response::Response {
    decision_response(Decision::from(denial))
}

pub fn binding_error_response(err: BindingError) -> axum::response::Response {
    denial_response(Denial::from(err))
}

/// Request bodies the handlers could not parse never reach the pipeline.
pub fn invalid_body(message: impl Into<String>) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        ErrorCode::InvalidParameter.as_str(),
        message,
    )
}
