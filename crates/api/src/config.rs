//! Environment-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;

use storegate_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    /// Header carrying the client's tenant claim.
    pub tenant_header: HeaderName,
    pub mutation_timeout: Duration,
    /// Deadline attached to every inbound request.
    pub request_deadline: Duration,
    /// Postgres when set, in-memory stores otherwise.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    pub enforce_matrix_monotonicity: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tenant_header: HeaderName::from_static("x-tenant-id"),
            mutation_timeout: Duration::from_millis(5_000),
            request_deadline: Duration::from_millis(10_000),
            database_url: None,
            log_format: LogFormat::Json,
            enforce_matrix_monotonicity: false,
        }
    }
}

impl ApiConfig {
    /// True when `JWT_SECRET` was left at the insecure dev default.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(secret) = var("JWT_SECRET") {
            config.jwt_secret = secret;
        }

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| ConfigError::invalid("BIND_ADDR", format!("{e}")))?;
        }

        if let Some(header) = var("TENANT_HEADER") {
            config.tenant_header = HeaderName::try_from(header.trim().to_ascii_lowercase())
                .map_err(|e| ConfigError::invalid("TENANT_HEADER", e.to_string()))?;
        }

        if let Some(ms) = var("MUTATION_TIMEOUT_MS") {
            config.mutation_timeout = parse_millis("MUTATION_TIMEOUT_MS", &ms)?;
        }

        if let Some(ms) = var("REQUEST_DEADLINE_MS") {
            config.request_deadline = parse_millis("REQUEST_DEADLINE_MS", &ms)?;
        }

        config.database_url = var("DATABASE_URL");

        if let Some(format) = var("LOG_FORMAT") {
            config.log_format = format
                .parse()
                .map_err(|e: storegate_observability::UnknownLogFormat| ConfigError::invalid("LOG_FORMAT", e.to_string()))?;
        }

        if let Some(flag) = var("ENFORCE_MATRIX_MONOTONICITY") {
            config.enforce_matrix_monotonicity = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::invalid(
                        "ENFORCE_MATRIX_MONOTONICITY",
                        format!("expected a boolean, got '{other}'"),
                    ));
                }
            };
        }

        Ok(config)
    }
}

fn parse_millis(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, format!("expected milliseconds, got '{raw}'")))?;
    if ms == 0 {
        return Err(ConfigError::invalid(name, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}
