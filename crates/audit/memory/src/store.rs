use async_trait::async_trait;
use dashmap::DashMap;

use shardvault_audit::error::AuditError;
use shardvault_audit::record::OperationEvent;
use shardvault_audit::store::AuditStore;

/// In-memory audit store using `DashMap`. Suitable for development and testing.
pub struct MemoryAuditStore {
    /// Event ID -> `OperationEvent`.
    events: DashMap<String, OperationEvent>,
}

impl MemoryAuditStore {
    /// Create a new empty in-memory audit store.
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
        }
    }

    /// Every stored event, oldest first.
    pub fn all(&self) -> Vec<OperationEvent> {
        let mut events: Vec<OperationEvent> =
            self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, event: OperationEvent) -> Result<(), AuditError> {
        self.events.insert(event.id.clone(), event);
        Ok(())
    }
}
