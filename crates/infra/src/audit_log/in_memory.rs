use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use storegate_auth::{AuditError, AuditEvent, AuditSink};
use storegate_core::UserId;

/// In-memory append-only audit log.
///
/// Intended for tests/dev. `set_failing` makes every emit fail, to exercise the
/// best-effort path.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything recorded so far, in emission order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, target_id: UserId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.target_id == Some(target_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("in-memory audit log marked failing".to_string()));
        }
        let mut events = self
            .events
            .write()
            .map_err(|_| AuditError::Write("lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}
