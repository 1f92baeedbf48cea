use thiserror::Error;

/// Errors raised while interpreting persisted records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A file carries a schema version that is neither legacy nor current.
    #[error("unknown schema version: {0}")]
    UnknownSchemaVersion(u32),
}
