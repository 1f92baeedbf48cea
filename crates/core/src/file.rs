use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{BucketId, FileId, FrameId};

/// Which record graph is authoritative for a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// Single frame per file; frame lists pointers.
    Legacy,
    /// File links directly to its shards.
    Current,
}

impl SchemaVersion {
    pub const LEGACY: u32 = 1;
    pub const CURRENT: u32 = 2;

    /// Interpret a persisted version field.
    ///
    /// Records written before versioning existed carry no version and are
    /// legacy. Any value other than 1 or 2 is rejected.
    pub fn from_raw(raw: Option<u32>) -> Result<Self, CoreError> {
        match raw {
            None | Some(Self::LEGACY) => Ok(Self::Legacy),
            Some(Self::CURRENT) => Ok(Self::Current),
            Some(other) => Err(CoreError::UnknownSchemaVersion(other)),
        }
    }

    /// The value stored in the version field.
    #[must_use]
    pub fn as_raw(self) -> u32 {
        match self {
            Self::Legacy => Self::LEGACY,
            Self::Current => Self::CURRENT,
        }
    }
}

/// A logical file (bucket entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub bucket: BucketId,
    /// Opaque client-supplied ordering/decryption token.
    pub index: String,
    pub mimetype: String,
    pub size: u64,
    /// Raw persisted schema version. Use [`File::schema`] to interpret it.
    pub version: Option<u32>,
    /// Legacy frame reference.
    pub frame: Option<FrameId>,
    pub created: DateTime<Utc>,
}

impl File {
    /// Create a current-schema file.
    #[must_use]
    pub fn current(bucket: BucketId, index: impl Into<String>, size: u64) -> Self {
        Self {
            id: FileId::generate(),
            bucket,
            index: index.into(),
            mimetype: "application/octet-stream".to_owned(),
            size,
            version: Some(SchemaVersion::CURRENT),
            frame: None,
            created: Utc::now(),
        }
    }

    /// Create a legacy file backed by the given frame.
    #[must_use]
    pub fn legacy(bucket: BucketId, index: impl Into<String>, size: u64, frame: FrameId) -> Self {
        Self {
            id: FileId::generate(),
            bucket,
            index: index.into(),
            mimetype: "application/octet-stream".to_owned(),
            size,
            version: Some(SchemaVersion::LEGACY),
            frame: Some(frame),
            created: Utc::now(),
        }
    }

    /// The schema generation that owns this file's content records.
    pub fn schema(&self) -> Result<SchemaVersion, CoreError> {
        SchemaVersion::from_raw(self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_is_legacy() {
        assert_eq!(SchemaVersion::from_raw(None), Ok(SchemaVersion::Legacy));
        assert_eq!(SchemaVersion::from_raw(Some(1)), Ok(SchemaVersion::Legacy));
    }

    #[test]
    fn version_two_is_current() {
        assert_eq!(SchemaVersion::from_raw(Some(2)), Ok(SchemaVersion::Current));
    }

    #[test]
    fn other_versions_are_rejected() {
        assert_eq!(
            SchemaVersion::from_raw(Some(3)),
            Err(CoreError::UnknownSchemaVersion(3))
        );
        assert_eq!(
            SchemaVersion::from_raw(Some(0)),
            Err(CoreError::UnknownSchemaVersion(0))
        );
    }

    #[test]
    fn constructors_tag_their_schema() {
        let bucket = BucketId::new("b");
        let file = File::current(bucket.clone(), "idx", 10);
        assert_eq!(file.schema(), Ok(SchemaVersion::Current));

        let file = File::legacy(bucket, "idx", 10, FrameId::new("f"));
        assert_eq!(file.schema(), Ok(SchemaVersion::Legacy));
        assert_eq!(file.frame.as_deref(), Some("f"));
    }
}
