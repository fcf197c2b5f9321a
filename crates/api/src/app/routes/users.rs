//! User-management routes. Every handler is a thin shell around one pipeline call.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query, rejection::QueryRejection},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Map, Value as JsonValue, json};

use crate::app::{dto, errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(view_user).patch(update_user).delete(delete_user))
        .route("/:id/restore", post(restore_user))
}

pub async fn view_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let decision = services
        .pipeline
        .view_user(caller.request(), caller.identity(), &id)
        .await;
    errors::decision_response(decision)
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let fields = match parse_object(&body) {
        Ok(fields) => fields,
        Err(res) => return res,
    };

    let decision = services
        .pipeline
        .update_user(caller.request(), caller.identity(), &id, &fields)
        .await;
    errors::decision_response(decision)
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let decision = services
        .pipeline
        .delete_user(caller.request(), caller.identity(), &id)
        .await;
    errors::decision_response(decision)
}

/// The body is optional; an empty one means "no reason given".
pub async fn restore_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        dto::RestoreUserRequest::default()
    } else {
        match serde_json::from_slice::<dto::RestoreUserRequest>(&body) {
            Ok(request) => request,
            Err(err) => return errors::invalid_body(format!("invalid restore body: {err}")),
        }
    };

    let decision = services
        .pipeline
        .restore_user(
            caller.request(),
            caller.identity(),
            &id,
            request.reason.as_deref(),
        )
        .await;
    errors::decision_response(decision)
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    query: Result<Query<dto::ListUsersQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(err) => return errors::invalid_body(err.body_text()),
    };

    let decision = services
        .pipeline
        .list_users(caller.request(), caller.identity(), query.include_deleted)
        .await;

    if !decision.allowed {
        return errors::decision_response(decision);
    }
    let items = decision.body.unwrap_or_else(|| json!([]));
    Json(json!({ "items": items })).into_response()
}

fn parse_object(body: &[u8]) -> Result<Map<String, JsonValue>, axum::response::Response> {
    match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Object(fields)) => Ok(fields),
        Ok(_) => Err(errors::invalid_body("request body must be a JSON object")),
        Err(err) => Err(errors::invalid_body(format!("malformed JSON body: {err}"))),
    }
}
