use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shard::ReplicationContract;
use crate::types::UploadId;

/// One shard the client wants to upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRequest {
    /// Position of the shard within the file.
    pub index: u32,
    pub size: u64,
}

/// A completed part of a multipart upload, as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// The client's claim that one admitted shard has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCommit {
    pub object_key: String,
    pub hash: String,
    /// Multipart session id; present only for multipart uploads.
    pub session_id: Option<String>,
    pub parts: Option<Vec<UploadPart>>,
}

impl ShardCommit {
    #[must_use]
    pub fn single(object_key: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            hash: hash.into(),
            session_id: None,
            parts: None,
        }
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Storage negotiated at admission, before content is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub id: UploadId,
    /// Node-local object key the client writes to.
    pub object_key: String,
    pub index: u32,
    pub size: u64,
    /// Candidate nodes chosen at admission.
    pub contracts: Vec<ReplicationContract>,
    pub created: DateTime<Utc>,
}

impl PendingUpload {
    #[must_use]
    pub fn new(request: ShardRequest, contract: ReplicationContract) -> Self {
        Self {
            id: UploadId::generate(),
            object_key: uuid::Uuid::new_v4().to_string(),
            index: request.index,
            size: request.size,
            contracts: vec![contract],
            created: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn pending_upload_copies_request() {
        let request = ShardRequest { index: 3, size: 42 };
        let upload = PendingUpload::new(request, ReplicationContract::new(NodeId::new("n"), 42));
        assert_eq!(upload.index, 3);
        assert_eq!(upload.size, 42);
        assert_eq!(upload.contracts.len(), 1);
        assert!(uuid::Uuid::parse_str(&upload.object_key).is_ok());
    }

    #[test]
    fn multipart_detection() {
        let mut commit = ShardCommit::single("k", "h");
        assert!(!commit.is_multipart());
        commit.session_id = Some("s".into());
        assert!(commit.is_multipart());
    }
}
