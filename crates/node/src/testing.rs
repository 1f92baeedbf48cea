//! Scripted [`NodeClient`] for exercising the control plane without a network.

use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use shardvault_core::{Node, NodeId, UploadPart};

use crate::client::{MultipartTarget, NodeClient};
use crate::error::NodeError;

/// One request received by a [`FakeNodeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    UploadUrl { node: NodeId, object_key: String },
    MultipartUrls { node: NodeId, object_key: String, parts: u32 },
    Finalize { node: NodeId, object_key: String, session_id: String },
    Abort { node: NodeId, object_key: String, session_id: String },
    Exists { node: NodeId, object_key: String },
    DownloadUrl { node: NodeId, object_key: String },
    Delete { url: String },
}

/// In-process stand-in for a fleet of storage nodes.
///
/// Every node holds every object unless told otherwise with
/// [`FakeNodeClient::set_exists`]. Nodes registered with
/// [`FakeNodeClient::fail_node`] answer every request with a connection error.
#[derive(Debug, Default)]
pub struct FakeNodeClient {
    exists: DashMap<NodeId, bool>,
    failing: DashSet<NodeId>,
    missing_on_delete: DashSet<String>,
    failing_deletes: DashSet<String>,
    calls: Mutex<Vec<NodeCall>>,
}

impl FakeNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the existence probe answer of `node`.
    pub fn set_exists(&self, node: impl Into<NodeId>, exists: bool) {
        self.exists.insert(node.into(), exists);
    }

    /// Make every request to `node` fail with a connection error.
    pub fn fail_node(&self, node: impl Into<NodeId>) {
        self.failing.insert(node.into());
    }

    /// Make a delete of `url` answer 404.
    pub fn missing_on_delete(&self, url: impl Into<String>) {
        self.missing_on_delete.insert(url.into());
    }

    /// Make a delete of `url` fail with a connection error.
    pub fn fail_delete(&self, url: impl Into<String>) {
        self.failing_deletes.insert(url.into());
    }

    /// Let deletes of `url` succeed again.
    pub fn recover_delete(&self, url: &str) {
        self.failing_deletes.remove(url);
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded calls for which `predicate` holds.
    pub fn count(&self, predicate: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, node: Option<&Node>, call: NodeCall) -> Result<(), NodeError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        match node {
            Some(node) if self.failing.contains(&node.id) => Err(NodeError::Connection(format!(
                "node {} unreachable",
                node.id
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NodeClient for FakeNodeClient {
    async fn request_upload_url(
        &self,
        node: &Node,
        object_key: &str,
    ) -> Result<String, NodeError> {
        self.record(
            Some(node),
            NodeCall::UploadUrl {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
            },
        )?;
        Ok(format!("{}/upload/{object_key}", node.base_url()))
    }

    async fn request_multipart_urls(
        &self,
        node: &Node,
        object_key: &str,
        parts: u32,
    ) -> Result<MultipartTarget, NodeError> {
        self.record(
            Some(node),
            NodeCall::MultipartUrls {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
                parts,
            },
        )?;
        let urls = (1..=parts)
            .map(|part| format!("{}/upload/{object_key}?part={part}", node.base_url()))
            .collect();
        Ok(MultipartTarget {
            urls,
            session_id: format!("session-{object_key}"),
        })
    }

    async fn finalize_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
        _parts: &[UploadPart],
    ) -> Result<(), NodeError> {
        self.record(
            Some(node),
            NodeCall::Finalize {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
                session_id: session_id.to_owned(),
            },
        )
    }

    async fn abort_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
    ) -> Result<(), NodeError> {
        self.record(
            Some(node),
            NodeCall::Abort {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
                session_id: session_id.to_owned(),
            },
        )
    }

    async fn object_exists(&self, node: &Node, object_key: &str) -> Result<bool, NodeError> {
        self.record(
            Some(node),
            NodeCall::Exists {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
            },
        )?;
        Ok(self.exists.get(&node.id).is_none_or(|e| *e))
    }

    async fn request_download_url(
        &self,
        node: &Node,
        object_key: &str,
    ) -> Result<String, NodeError> {
        self.record(
            Some(node),
            NodeCall::DownloadUrl {
                node: node.id.clone(),
                object_key: object_key.to_owned(),
            },
        )?;
        Ok(format!("{}/download/{object_key}", node.base_url()))
    }

    async fn delete_object(&self, url: &str) -> Result<(), NodeError> {
        self.record(None, NodeCall::Delete { url: url.to_owned() })?;
        if self.missing_on_delete.contains(url) {
            return Err(NodeError::ObjectNotFound(url.to_owned()));
        }
        if self.failing_deletes.contains(url) {
            return Err(NodeError::Connection(format!("{url} unreachable")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probes_default_to_present() {
        let fake = FakeNodeClient::new();
        let node = Node::new("n1", "h", 1);
        assert!(fake.object_exists(&node, "k").await.unwrap());

        fake.set_exists("n1", false);
        assert!(!fake.object_exists(&node, "k").await.unwrap());
        assert_eq!(fake.count(|c| matches!(c, NodeCall::Exists { .. })), 2);
    }

    #[tokio::test]
    async fn failing_node_still_records_call() {
        let fake = FakeNodeClient::new();
        let node = Node::new("n1", "h", 1);
        fake.fail_node("n1");
        let err = fake.request_upload_url(&node, "k").await.unwrap_err();
        assert!(matches!(err, NodeError::Connection(_)));
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn multipart_urls_match_part_count() {
        let fake = FakeNodeClient::new();
        let node = Node::new("n1", "h", 1);
        let target = fake.request_multipart_urls(&node, "k", 3).await.unwrap();
        assert_eq!(target.urls.len(), 3);
        assert_eq!(target.session_id, "session-k");
    }

    #[tokio::test]
    async fn scripted_missing_delete() {
        let fake = FakeNodeClient::new();
        fake.missing_on_delete("http://h:1/v2/shards/k");
        let err = fake.delete_object("http://h:1/v2/shards/k").await.unwrap_err();
        assert!(matches!(err, NodeError::ObjectNotFound(_)));
        assert!(fake.delete_object("http://h:1/v2/shards/other").await.is_ok());
    }
}
