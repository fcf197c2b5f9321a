//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: which store and audit log back the pipeline
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: decision and error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use storegate_auth::{Hs256JwtValidator, IdentityBinder, PipelineConfig};

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let pipeline_config = PipelineConfig {
        mutation_timeout: config.mutation_timeout,
        ..PipelineConfig::default()
    };

    let app_services = match &config.database_url {
        Some(url) => AppServices::postgres(url, pipeline_config).await?,
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory user store and audit log");
            AppServices::in_memory(pipeline_config)
        }
    };

    services::check_matrices(
        app_services.pipeline.matrices(),
        config.enforce_matrix_monotonicity,
    )?;

    Ok(router(Arc::new(app_services), config))
}

/// Assemble routes around already-built services.
pub fn router(services: Arc<AppServices>, config: &ApiConfig) -> Router {
    let auth_state = middleware::AuthState {
        jwt: Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes())),
        binder: IdentityBinder::new(),
        tenant_header: config.tenant_header.clone(),
        request_deadline: config.request_deadline,
    };

    // Protected routes: require a bearer token and a bound tenant.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
