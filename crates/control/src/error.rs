use thiserror::Error;

use shardvault_channel::ChannelError;
use shardvault_core::{BucketId, CoreError, FileId, NodeId, ShardId};
use shardvault_node::NodeError;
use shardvault_repository::RepositoryError;

/// Broad class of a [`ControlError`], for mapping to transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Authorization,
    Validation,
    Capacity,
    Consistency,
    Operational,
    Internal,
}

/// Errors raised by the control plane.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("bucket not found: {0}")]
    BucketNotFound(BucketId),

    /// The bucket exists but belongs to someone else.
    #[error("bucket {0} is not owned by the caller")]
    BucketForbidden(BucketId),

    #[error("file not found: {0}")]
    FileNotFound(FileId),

    #[error("shard not found: {0}")]
    ShardNotFound(ShardId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("shard indices must be unique")]
    InvalidUploadIndices,

    #[error("invalid multipart value: {0}")]
    InvalidMultipartValue(String),

    /// Fewer pending uploads matched the commit than shards were committed.
    #[error("missing uploads: expected {expected}, found {found}")]
    MissingUploads { expected: usize, found: usize },

    #[error("quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("no storage node available")]
    NoNodeAvailable,

    #[error("unknown schema version: {0}")]
    UnknownSchemaVersion(u32),

    /// No candidate node confirmed holding the shard.
    #[error("shard not stored: {0}")]
    ShardNotStored(String),

    #[error("no mirrors found for shard {0}, even after repair")]
    NoMirrors(String),

    #[error("downloads of legacy file {0} are not supported")]
    LegacyDownloadUnsupported(FileId),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<CoreError> for ControlError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownSchemaVersion(v) => Self::UnknownSchemaVersion(v),
        }
    }
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BucketNotFound(_)
            | Self::FileNotFound(_)
            | Self::ShardNotFound(_)
            | Self::NodeNotFound(_)
            | Self::UserNotFound(_) => ErrorKind::NotFound,
            Self::BucketForbidden(_) => ErrorKind::Authorization,
            Self::InvalidUploadIndices
            | Self::InvalidMultipartValue(_)
            | Self::MissingUploads { .. }
            | Self::LegacyDownloadUnsupported(_) => ErrorKind::Validation,
            Self::QuotaExceeded { .. } => ErrorKind::Capacity,
            Self::UnknownSchemaVersion(_) | Self::ShardNotStored(_) | Self::NoMirrors(_) => {
                ErrorKind::Consistency
            }
            Self::NoNodeAvailable | Self::Node(_) | Self::Channel(_) => ErrorKind::Operational,
            Self::Configuration(_) | Self::Repository(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        assert_eq!(
            ControlError::BucketNotFound("b".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ControlError::BucketForbidden("b".into()).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            ControlError::InvalidUploadIndices.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ControlError::QuotaExceeded {
                requested: 1,
                available: 0
            }
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            ControlError::ShardNotStored("k".into()).kind(),
            ErrorKind::Consistency
        );
        assert_eq!(ControlError::NoNodeAvailable.kind(), ErrorKind::Operational);
        assert_eq!(
            ControlError::from(RepositoryError::Backend("x".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn schema_errors_convert() {
        let err = ControlError::from(CoreError::UnknownSchemaVersion(7));
        assert!(matches!(err, ControlError::UnknownSchemaVersion(7)));
        assert_eq!(err.to_string(), "unknown schema version: 7");
    }
}
