//! Postgres-backed user store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | Read path | Mutation path |
//! |------------|-----------------|-----------|---------------|
//! | Database (serialization failure) | `40001` | `Backend` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Backend` | `Conflict` |
//! | Database (lock not available) | `55P03` | `Backend` | `Conflict` |
//! | Database (query canceled / statement timeout) | `57014` | `Unavailable` | `Timeout` |
//! | Database (other) | any other | `Backend` | `Backend` |
//! | PoolTimedOut | N/A | `Unavailable` | `Timeout` |
//! | PoolClosed / Io | N/A | `Unavailable` | `Unavailable` |
//! | Other | N/A | `Backend` | `Backend` |
//!
//! A mutation's budget covers everything up to COMMIT. Past the deadline the
//! transaction is rolled back; COMMIT itself is never cancelled.
//!
//! Lookups are tenant-agnostic on purpose: tenant scope is a pipeline gate, and
//! the pipeline needs to distinguish "absent" from "elsewhere" for auditing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::time::Instant;
use tracing::instrument;

use storegate_auth::{
    Mutation, MutationError, MutationResult, Role, StoreError, TransactionalMutator, TxOptions, UserDirectory,
    UserRecord,
};
use storegate_core::{TenantId, UserId};

use super::apply_mutation;

/// Idempotent DDL for the `users` table.
pub const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    tenant_id     UUID NOT NULL,
    role          TEXT NOT NULL CHECK (role IN ('SUPERADMIN', 'OPERADOR', 'CLIENTE_ADMIN', 'CLIENTE_USER')),
    is_active     BOOLEAN NOT NULL DEFAULT TRUE,
    deleted_at    TIMESTAMPTZ NULL,
    email         TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    password_hash TEXT NULL
);

CREATE INDEX IF NOT EXISTS users_tenant_created_idx ON users (tenant_id, created_at);
"#;

const SELECT_USER: &str = r#"
    SELECT id, tenant_id, role, is_active, deleted_at, email,
           first_name, last_name, created_at, updated_at, password_hash
    FROM users
"#;

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(USERS_SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_read_error("ensure_schema", e))?;
        Ok(())
    }

    /// Provisioning hook for dev seeding and tests. Account creation proper is external.
    #[instrument(skip(self, user), fields(user_id = %user.id, tenant_id = %user.tenant_id), err)]
    pub async fn insert(&self, user: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, tenant_id, role, is_active, deleted_at, email,
                first_name, last_name, created_at, updated_at, password_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.tenant_id.as_uuid())
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.deleted_at)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(&user.password_hash)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_read_error("insert_user", e))?;
        Ok(())
    }

    /// Everything up to (not including) COMMIT. Dropping the returned transaction rolls it back.
    async fn prepare_mutation(
        &self,
        mutation: Mutation,
        opts: TxOptions,
    ) -> Result<(Transaction<'static, Postgres>, MutationResult), MutationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_mutation_error("begin_transaction", e))?;

        // Must be the first statement of the transaction.
        let isolation = format!("SET TRANSACTION ISOLATION LEVEL {}", opts.isolation.as_sql());
        sqlx::query(&isolation)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_mutation_error("set_isolation", e))?;

        let timeout = format!("SET LOCAL statement_timeout = {}", opts.timeout.as_millis().max(1));
        sqlx::query(&timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_mutation_error("set_statement_timeout", e))?;

        let Some(current) = lock_user(&mut tx, mutation.target()).await? else {
            rollback(tx).await;
            return Err(MutationError::NotFound);
        };

        let next = match apply_mutation(&current, &mutation) {
            Ok(next) => next,
            Err(err) => {
                rollback(tx).await;
                return Err(err);
            }
        };

        sqlx::query(
            r#"
            UPDATE users
            SET role = $2,
                is_active = $3,
                deleted_at = $4,
                email = $5,
                first_name = $6,
                last_name = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(next.id.as_uuid())
        .bind(next.role.as_str())
        .bind(next.is_active)
        .bind(next.deleted_at)
        .bind(&next.email)
        .bind(&next.first_name)
        .bind(&next.last_name)
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_mutation_error("update_user", e))?;

        Ok((
            tx,
            MutationResult {
                before: current,
                after: next,
            },
        ))
    }
}

#[async_trait::async_trait]
impl UserDirectory for PostgresUserStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("{SELECT_USER} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_read_error("find_by_id", e))?;

        row.map(|r| user_from_row(&r))
            .transpose()
            .map_err(|e| StoreError::Backend(format!("failed to decode user row: {e}")))
    }

    #[instrument(skip(self), fields(tenant_id = ?tenant.map(|t| t.to_string())), err)]
    async fn list(&self, tenant: Option<TenantId>, include_deleted: bool) -> Result<Vec<UserRecord>, StoreError> {
        let query = format!(
            "{SELECT_USER} WHERE ($1::uuid IS NULL OR tenant_id = $1) AND ($2 OR deleted_at IS NULL) \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(tenant.map(|t| *t.as_uuid()))
            .bind(include_deleted)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_read_error("list_users", e))?;

        rows.iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(format!("failed to decode user row: {e}")))
    }
}

#[async_trait::async_trait]
impl TransactionalMutator for PostgresUserStore {
    #[instrument(
        skip(self, mutation),
        fields(user_id = %mutation.target(), isolation = opts.isolation.as_sql()),
        err
    )]
    async fn mutate(&self, mutation: Mutation, opts: TxOptions) -> Result<MutationResult, MutationError> {
        let deadline = Instant::now() + opts.timeout;

        let (tx, result) = tokio::time::timeout_at(deadline, self.prepare_mutation(mutation, opts))
            .await
            .map_err(|_| MutationError::Timeout)??;

        if Instant::now() >= deadline {
            rollback(tx).await;
            return Err(MutationError::Timeout);
        }

        // COMMIT is never cancelled: once sent, its outcome is the outcome.
        tx.commit()
            .await
            .map_err(|e| map_mutation_error("commit_transaction", e))?;
        Ok(result)
    }
}

/// Re-read the row inside the transaction and lock it.
async fn lock_user(
    tx: &mut Transaction<'_, Postgres>,
    id: UserId,
) -> Result<Option<UserRecord>, MutationError> {
    let query = format!("{SELECT_USER} WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&query)
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_mutation_error("lock_user", e))?;

    row.map(|r| user_from_row(&r))
        .transpose()
        .map_err(|e| MutationError::Backend(format!("failed to decode user row: {e}")))
}

async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(error = %err, "rollback failed");
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role: Role = role.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(UserRecord {
        id: UserId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        role,
        is_active: row.try_get("is_active")?,
        deleted_at: row.try_get("deleted_at")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        created_at,
        updated_at,
        password_hash: row.try_get("password_hash")?,
        extra: serde_json::Map::new(),
    })
}

fn db_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn map_read_error(operation: &str, err: sqlx::Error) -> StoreError {
    let code = db_code(&err);
    match (&err, code.as_deref()) {
        (sqlx::Error::Database(_), Some("57014")) => {
            StoreError::Unavailable(format!("statement timeout in {operation}"))
        }
        (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_), _) => {
            StoreError::Unavailable(format!("database unreachable in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn map_mutation_error(operation: &str, err: sqlx::Error) -> MutationError {
    let code = db_code(&err);
    match (&err, code.as_deref()) {
        (sqlx::Error::Database(_), Some("40001" | "40P01" | "55P03")) => {
            MutationError::Conflict(format!("{operation}: {err}"))
        }
        (sqlx::Error::Database(_), Some("57014")) | (sqlx::Error::PoolTimedOut, _) => MutationError::Timeout,
        (sqlx::Error::PoolClosed | sqlx::Error::Io(_), _) => {
            MutationError::Unavailable(format!("database unreachable in {operation}: {err}"))
        }
        _ => MutationError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
