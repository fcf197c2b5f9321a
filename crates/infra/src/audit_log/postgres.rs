//! Postgres-backed audit log. Rows are insert-only; a trigger rejects UPDATE and DELETE.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::instrument;

use storegate_auth::{AuditError, AuditEvent, AuditSink};

pub const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    event_id         UUID PRIMARY KEY,
    request_id       UUID NOT NULL,
    action           TEXT NOT NULL,
    actor_id         UUID NOT NULL,
    actor_role       TEXT NOT NULL,
    actor_tenant_id  UUID NOT NULL,
    target_id        UUID NULL,
    target_tenant_id UUID NULL,
    outcome          TEXT NOT NULL CHECK (outcome IN ('ALLOW', 'DENY')),
    error_code       TEXT NULL,
    reason           TEXT NULL,
    old_values       JSONB NULL,
    new_values       JSONB NULL,
    occurred_at      TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_events_target_idx ON audit_events (target_id, occurred_at);
CREATE INDEX IF NOT EXISTS audit_events_tenant_idx ON audit_events (actor_tenant_id, occurred_at);

CREATE OR REPLACE FUNCTION audit_events_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'audit_events is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS audit_events_no_rewrite ON audit_events;
CREATE TRIGGER audit_events_no_rewrite
    BEFORE UPDATE OR DELETE ON audit_events
    FOR EACH ROW EXECUTE FUNCTION audit_events_append_only();
"#;

#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn ensure_schema(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(AUDIT_SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| AuditError::Write(format!("ensure_schema: {e}")))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuditSink for PostgresAuditLog {
    #[instrument(skip(self, event), fields(event_id = %event.event_id, action = %event.action), err)]
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                event_id, request_id, action, actor_id, actor_role, actor_tenant_id,
                target_id, target_tenant_id, outcome, error_code, reason,
                old_values, new_values, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(event.event_id)
        .bind(event.request_id)
        .bind(event.action.as_str())
        .bind(event.actor_id.as_uuid())
        .bind(event.actor_role.as_str())
        .bind(event.actor_tenant_id.as_uuid())
        .bind(event.target_id.map(uuid::Uuid::from))
        .bind(event.target_tenant_id.map(uuid::Uuid::from))
        .bind(event.outcome.as_str())
        .bind(event.error_code.map(|c| c.as_str()))
        .bind(&event.reason)
        .bind(event.old_values.map(JsonValue::Object))
        .bind(event.new_values.map(JsonValue::Object))
        .bind(event.timestamp)
        .execute(&*self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AuditError::Unavailable(e.to_string())
            }
            other => AuditError::Write(other.to_string()),
        })?;
        Ok(())
    }
}
