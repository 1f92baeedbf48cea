use async_trait::async_trait;

use crate::error::AuditError;
use crate::record::OperationEvent;

/// Sink for operational events.
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist an event.
    async fn record(&self, event: OperationEvent) -> Result<(), AuditError>;
}
