/// Failures of an [`AuditStore`](crate::AuditStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The sink rejected or could not persist the event.
    #[error("audit sink error: {0}")]
    Sink(String),

    /// An event could not be encoded for the sink.
    #[error("audit encoding error: {0}")]
    Encoding(String),
}
