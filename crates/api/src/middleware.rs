use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use storegate_auth::{BindingError, IdentityBinder, JwtClaims, JwtValidator, RequestContext};

use crate::app::errors::binding_error_response;
use crate::context::CallerContext;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub binder: IdentityBinder,
    pub tenant_header: HeaderName,
    pub request_deadline: Duration,
}

/// Verify the bearer token, bind the tenant claim, and attach a [`CallerContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let request_id = request_id(req.headers());

    let claims = match authenticate(&state, req.headers()) {
        Ok(claims) => claims,
        Err(err) => return with_request_id(binding_error_response(err), request_id),
    };

    let tenant_claim = tenant_claim(req.headers(), &state.tenant_header);
    let identity = match state.binder.bind(Some(&claims), tenant_claim.as_deref()) {
        Ok(identity) => identity,
        Err(err) => return with_request_id(binding_error_response(err), request_id),
    };

    let request = RequestContext::new()
        .with_request_id(request_id)
        .with_budget(state.request_deadline);
    req.extensions_mut()
        .insert(CallerContext::new(identity, request));

    with_request_id(next.run(req).await, request_id)
}

fn authenticate(state: &AuthState, headers: &HeaderMap) -> Result<JwtClaims, BindingError> {
    let token = extract_bearer(headers).ok_or(BindingError::Unauthenticated)?;
    state.jwt.validate(token, Utc::now()).map_err(|err| {
        tracing::info!(
            target: "storegate::security",
            error = %err,
            "bearer token rejected"
        );
        BindingError::Unauthenticated
    })
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// A header that is present but not valid UTF-8 still counts as a (failing) claim.
fn tenant_claim(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| v.to_str().map(str::to_owned).unwrap_or_default())
}

fn request_id(headers: &HeaderMap) -> Uuid {
    headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::try_parse(v.trim()).ok())
        .unwrap_or_else(Uuid::now_v7)
}

fn with_request_id(mut res: Response, request_id: Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &[u8])]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for &(name, value) in pairs {
            h.insert(
                HeaderName::from_static(name),
                HeaderValue::from_bytes(value).unwrap(),
            );
        }
        h
    }

    #[test]
    fn bearer_requires_scheme_and_token() {
        assert_eq!(extract_bearer(&headers(&[("authorization", b"Bearer abc")])), Some("abc"));
        assert_eq!(extract_bearer(&headers(&[("authorization", b"Basic abc")])), None);
        assert_eq!(extract_bearer(&headers(&[("authorization", b"Bearer   ")])), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn non_utf8_tenant_header_is_an_empty_claim() {
        let name = HeaderName::from_static("x-tenant-id");
        assert_eq!(tenant_claim(&headers(&[("x-tenant-id", b"\xff\xfe")]), &name), Some(String::new()));
        assert_eq!(tenant_claim(&HeaderMap::new(), &name), None);
    }

    #[test]
    fn request_id_is_reused_only_when_it_is_a_uuid() {
        let id = Uuid::now_v7();
        let given = headers(&[("x-request-id", id.to_string().as_bytes())]);
        assert_eq!(request_id(&given), id);

        let junk = headers(&[("x-request-id", b"not-a-uuid")]);
        assert_ne!(request_id(&junk).to_string(), "not-a-uuid");
    }
}
