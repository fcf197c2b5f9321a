//! Collaborator wiring: which store and audit log sit behind the pipeline.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use storegate_auth::{AuthorizationPipeline, PermissionMatrices, PipelineConfig};
use storegate_infra::{InMemoryAuditLog, InMemoryUserStore, PostgresAuditLog, PostgresUserStore};

#[derive(Clone)]
pub enum Backend {
    InMemory {
        users: Arc<InMemoryUserStore>,
        audit: Arc<InMemoryAuditLog>,
    },
    Postgres {
        users: Arc<PostgresUserStore>,
        audit: Arc<PostgresAuditLog>,
    },
}

#[derive(Clone)]
pub struct AppServices {
    pub pipeline: AuthorizationPipeline,
    pub backend: Backend,
}

impl AppServices {
    pub fn in_memory(config: PipelineConfig) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let pipeline = AuthorizationPipeline::new(users.clone(), users.clone(), audit.clone()).with_config(config);

        Self {
            pipeline,
            backend: Backend::InMemory { users, audit },
        }
    }

    pub async fn postgres(database_url: &str, config: PipelineConfig) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to Postgres")?;

        let users = Arc::new(PostgresUserStore::new(pool.clone()));
        users
            .ensure_schema()
            .await
            .context("failed to create users schema")?;

        let audit = Arc::new(PostgresAuditLog::new(pool));
        audit
            .ensure_schema()
            .await
            .context("failed to create audit schema")?;

        let pipeline = AuthorizationPipeline::new(users.clone(), users.clone(), audit.clone()).with_config(config);

        Ok(Self {
            pipeline,
            backend: Backend::Postgres { users, audit },
        })
    }

    /// The in-memory store, when that is what is wired (dev seeding and tests).
    pub fn in_memory_users(&self) -> Option<&Arc<InMemoryUserStore>> {
        match &self.backend {
            Backend::InMemory { users, .. } => Some(users),
            Backend::Postgres { .. } => None,
        }
    }

    pub fn in_memory_audit(&self) -> Option<&Arc<InMemoryAuditLog>> {
        match &self.backend {
            Backend::InMemory { audit, .. } => Some(audit),
            Backend::Postgres { .. } => None,
        }
    }
}

/// Report matrix monotonicity at startup; refuse to start only when `enforce` is set.
pub fn check_matrices(matrices: &PermissionMatrices, enforce: bool) -> anyhow::Result<()> {
    let violations = matrices.monotonicity_violations();
    for violation in &violations {
        tracing::warn!(
            target: "storegate::security",
            table = violation.table,
            higher = %violation.higher,
            lower = %violation.lower,
            entry = %violation.entry,
            "permission matrices are not monotonic"
        );
    }

    if enforce {
        matrices
            .ensure_monotonic()
            .context("ENFORCE_MATRIX_MONOTONICITY is set")?;
    }
    Ok(())
}
