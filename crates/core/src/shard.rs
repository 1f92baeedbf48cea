use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FileId, LinkId, MirrorId, NodeId, ShardId};

/// Separator between the session token and the content hash of a shard whose
/// hash has been disambiguated at commit time.
pub const HASH_PREFIX_SEPARATOR: char = '$';

/// Prefix `hash` with a fresh random token so that two uploads of identical
/// content never collide on the hash before either is confirmed.
#[must_use]
pub fn disambiguate_hash(hash: &str) -> String {
    format!("{}{HASH_PREFIX_SEPARATOR}{hash}", Uuid::new_v4().simple())
}

/// The content hash with any session prefix removed.
#[must_use]
pub fn content_hash(hash: &str) -> &str {
    hash.split_once(HASH_PREFIX_SEPARATOR)
        .map_or(hash, |(_, content)| content)
}

/// The terms under which one node agreed to hold one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationContract {
    pub node_id: NodeId,
    pub data_size: u64,
    pub data_hash: Option<String>,
    pub negotiated_at: DateTime<Utc>,
    pub version: u32,
}

impl ReplicationContract {
    /// A contract negotiated now with `node_id` for `data_size` bytes.
    #[must_use]
    pub fn new(node_id: NodeId, data_size: u64) -> Self {
        Self {
            node_id,
            data_size,
            data_hash: None,
            negotiated_at: Utc::now(),
            version: 1,
        }
    }

    /// Same contract with the content hash filled in.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.data_hash = Some(hash.into());
        self
    }
}

/// The unit of stored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub id: ShardId,
    /// Content hash. Current-schema shards carry a session prefix, see
    /// [`disambiguate_hash`].
    pub hash: String,
    /// Node-local object key.
    pub object_key: String,
    pub size: u64,
    /// One contract per node believed to hold the shard.
    pub contracts: Vec<ReplicationContract>,
}

impl Shard {
    /// Node ids named by this shard's contracts.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.contracts.iter().map(|c| &c.node_id)
    }
}

/// Bookkeeping record asserting one node holds one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub id: MirrorId,
    pub shard_hash: String,
    pub node_id: NodeId,
    pub contract: ReplicationContract,
    pub is_established: bool,
}

impl Mirror {
    /// An established mirror for the given shard hash and contract.
    #[must_use]
    pub fn established(shard_hash: impl Into<String>, contract: ReplicationContract) -> Self {
        Self {
            id: MirrorId::generate(),
            shard_hash: shard_hash.into(),
            node_id: contract.node_id.clone(),
            contract,
            is_established: true,
        }
    }
}

/// Join record placing a shard at a position within a current-schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShardLink {
    pub id: LinkId,
    pub file_id: FileId,
    pub shard_id: ShardId,
    pub index: u32,
}

impl FileShardLink {
    #[must_use]
    pub fn new(file_id: FileId, shard_id: ShardId, index: u32) -> Self {
        Self {
            id: LinkId::generate(),
            file_id,
            shard_id,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disambiguated_hashes_keep_the_content_hash() {
        let first = disambiguate_hash("abc");
        let second = disambiguate_hash("abc");
        assert_ne!(first, second);
        assert!(first.ends_with("$abc"));
        let (token, hash) = first.split_once(HASH_PREFIX_SEPARATOR).unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(hash, "abc");
    }

    #[test]
    fn content_hash_strips_prefix() {
        assert_eq!(content_hash(&disambiguate_hash("abc")), "abc");
        assert_eq!(content_hash("plain"), "plain");
    }

    #[test]
    fn established_mirror_copies_node_from_contract() {
        let contract = ReplicationContract::new(NodeId::new("n1"), 10).with_hash("h");
        let mirror = Mirror::established("h", contract);
        assert_eq!(mirror.node_id.as_str(), "n1");
        assert!(mirror.is_established);
        assert_eq!(mirror.contract.data_hash.as_deref(), Some("h"));
    }
}
