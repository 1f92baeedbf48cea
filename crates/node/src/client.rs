use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shardvault_core::{Node, UploadPart};

use crate::error::NodeError;

/// Write targets of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartTarget {
    /// One presigned URL per part, in part order.
    pub urls: Vec<String>,
    pub session_id: String,
}

/// Operations the control plane performs against a storage node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// A URL the client can write `object_key` to in one request.
    async fn request_upload_url(&self, node: &Node, object_key: &str)
    -> Result<String, NodeError>;

    /// `parts` part URLs plus the session id that ties them together.
    async fn request_multipart_urls(
        &self,
        node: &Node,
        object_key: &str,
        parts: u32,
    ) -> Result<MultipartTarget, NodeError>;

    async fn finalize_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
        parts: &[UploadPart],
    ) -> Result<(), NodeError>;

    async fn abort_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
    ) -> Result<(), NodeError>;

    /// Whether the node holds `object_key`.
    async fn object_exists(&self, node: &Node, object_key: &str) -> Result<bool, NodeError>;

    async fn request_download_url(
        &self,
        node: &Node,
        object_key: &str,
    ) -> Result<String, NodeError>;

    /// Issue a delete against a fully built endpoint URL.
    ///
    /// A 404 answer is reported as [`NodeError::ObjectNotFound`].
    async fn delete_object(&self, url: &str) -> Result<(), NodeError>;
}
