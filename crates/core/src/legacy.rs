//! Records of the legacy (v1) layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FileId, FrameId, PointerId, UserId};

/// Ordered list of pointers making up one legacy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub user: UserId,
    /// Pointer ids in content order.
    pub shards: Vec<PointerId>,
    pub size: u64,
    pub locked: bool,
    pub bucket_entry: Option<FileId>,
    pub created: DateTime<Utc>,
}

/// A legacy reference to one stored shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    pub id: PointerId,
    pub index: u32,
    /// Content hash of the shard.
    pub hash: String,
    pub size: u64,
    pub parity: bool,
    /// Audit material owned by the audit subsystem; deleted with the pointer.
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub tree: Vec<String>,
}
