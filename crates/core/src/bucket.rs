use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BucketId, UserId};

/// Lifecycle status of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStatus {
    #[default]
    Active,
    Inactive,
}

/// A named container of files owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    /// Owner by legacy id.
    pub owner_id: UserId,
    /// Owner by stable uuid.
    pub owner_uuid: Uuid,
    pub encryption_key: String,
    /// Unique per owner.
    pub name: String,
    #[serde(default)]
    pub status: BucketStatus,
    /// Legacy transfer counter.
    #[serde(default)]
    pub transfer: u64,
    /// Legacy storage counter.
    #[serde(default)]
    pub storage: u64,
    pub max_frame_size: Option<u64>,
    #[serde(default)]
    pub public_permissions: Vec<String>,
}

impl Bucket {
    /// Create an active bucket owned by the given user.
    #[must_use]
    pub fn new(owner_id: impl Into<UserId>, owner_uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: BucketId::generate(),
            owner_id: owner_id.into(),
            owner_uuid,
            encryption_key: String::new(),
            name: name.into(),
            status: BucketStatus::Active,
            transfer: 0,
            storage: 0,
            max_frame_size: None,
            public_permissions: Vec::new(),
        }
    }

    /// Whether the bucket belongs to the user with the given legacy id.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }

    /// Whether the bucket belongs to the user with the given uuid.
    #[must_use]
    pub fn is_owned_by_uuid(&self, user: Uuid) -> bool {
        self.owner_uuid == user
    }
}
