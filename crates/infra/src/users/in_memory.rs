use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use storegate_auth::{
    Mutation, MutationError, MutationResult, StoreError, TransactionalMutator, TxOptions, UserDirectory,
    UserRecord,
};
use storegate_core::{TenantId, UserId};

use super::apply_mutation;

/// In-memory user store.
///
/// One lock guards every row, so transactions are trivially serializable.
/// Intended for tests/dev; `with_latency` and `set_unavailable` simulate a slow
/// or failing backend.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    rows: Mutex<HashMap<UserId, UserRecord>>,
    latency: Option<Duration>,
    unavailable: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read and transaction waits `latency` while holding the lock.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn insert(&self, user: UserRecord) {
        self.rows.lock().await.insert(user.id, user);
    }

    pub async fn get(&self, id: UserId) -> Option<UserRecord> {
        self.rows.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn simulate_io(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().await;
        self.simulate_io().await;
        Ok(rows.get(&id).cloned())
    }

    async fn list(&self, tenant: Option<TenantId>, include_deleted: bool) -> Result<Vec<UserRecord>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().await;
        self.simulate_io().await;
        let mut out: Vec<UserRecord> = rows
            .values()
            .filter(|u| tenant.is_none_or(|t| u.tenant_id == t))
            .filter(|u| include_deleted || !u.is_deleted())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[async_trait::async_trait]
impl TransactionalMutator for InMemoryUserStore {
    async fn mutate(&self, mutation: Mutation, opts: TxOptions) -> Result<MutationResult, MutationError> {
        if let Err(StoreError::Unavailable(detail) | StoreError::Backend(detail)) = self.check_available() {
            return Err(MutationError::Unavailable(detail));
        }

        let deadline = Instant::now() + opts.timeout;
        let mut rows = tokio::time::timeout_at(deadline, self.rows.lock())
            .await
            .map_err(|_| MutationError::Timeout)?;
        tokio::time::timeout_at(deadline, self.simulate_io())
            .await
            .map_err(|_| MutationError::Timeout)?;

        let current = rows.get(&mutation.target()).ok_or(MutationError::NotFound)?;
        let next = apply_mutation(current, &mutation)?;

        // Commit point: nothing below awaits.
        if Instant::now() >= deadline {
            return Err(MutationError::Timeout);
        }
        let before = current.clone();
        rows.insert(next.id, next.clone());
        Ok(MutationResult { before, after: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use storegate_auth::{IsolationLevel, Role};

    fn opts(timeout_ms: u64) -> TxOptions {
        TxOptions {
            isolation: IsolationLevel::Serializable,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn list_filters_by_tenant_and_deletion() {
        let store = InMemoryUserStore::new();
        let t1 = TenantId::new();
        let mut gone = UserRecord::new(t1, Role::ClienteUser, "g@x.io", "G", "X");
        gone.deleted_at = Some(Utc::now());
        store.insert(gone).await;
        store.insert(UserRecord::new(t1, Role::ClienteUser, "a@x.io", "A", "X")).await;
        store.insert(UserRecord::new(TenantId::new(), Role::ClienteUser, "b@x.io", "B", "X")).await;

        assert_eq!(store.list(Some(t1), false).await.unwrap().len(), 1);
        assert_eq!(store.list(Some(t1), true).await.unwrap().len(), 2);
        assert_eq!(store.list(None, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_restores_serialize() {
        let store = Arc::new(InMemoryUserStore::new().with_latency(Duration::from_millis(5)));
        let mut user = UserRecord::new(TenantId::new(), Role::ClienteUser, "r@x.io", "R", "X");
        user.deleted_at = Some(Utc::now());
        let id = user.id;
        store.insert(user).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .mutate(Mutation::Restore { id, at: Utc::now() }, opts(1_000))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        let mut not_deleted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(MutationError::NotDeleted) => not_deleted += 1,
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(not_deleted, 3);
    }

    #[tokio::test]
    async fn timed_out_transaction_does_not_commit() {
        let store = InMemoryUserStore::new().with_latency(Duration::from_millis(100));
        let user = UserRecord::new(TenantId::new(), Role::ClienteUser, "t@x.io", "T", "X");
        let id = user.id;
        store.insert(user).await;

        let err = store
            .mutate(Mutation::SoftDelete { id, at: Utc::now() }, opts(10))
            .await
            .unwrap_err();
        assert_eq!(err, MutationError::Timeout);
        assert!(!store.get(id).await.unwrap().is_deleted());
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads_and_writes() {
        let store = InMemoryUserStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_by_id(UserId::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store
                .mutate(Mutation::Restore { id: UserId::new(), at: Utc::now() }, opts(50))
                .await,
            Err(MutationError::Unavailable(_))
        ));
    }
}
