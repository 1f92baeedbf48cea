use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserId;

/// An account owning buckets and a storage allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Legacy identifier; buckets reference their owner by this value.
    pub id: UserId,
    /// Stable identifier used by newer callers.
    pub uuid: Uuid,
    pub email: String,
    /// Capacity limit in bytes.
    pub max_space_bytes: u64,
    /// Running usage counter. Authoritative only when `usage_migrated` is set.
    pub total_used_space_bytes: u64,
    /// `false` while the account still has files accounted for by the legacy
    /// schema, whose sizes are not reflected in `total_used_space_bytes`.
    #[serde(default)]
    pub usage_migrated: bool,
}

impl User {
    /// Create a fully migrated user with zero usage.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, max_space_bytes: u64) -> Self {
        Self {
            id: id.into(),
            uuid: Uuid::new_v4(),
            email: email.into(),
            max_space_bytes,
            total_used_space_bytes: 0,
            usage_migrated: true,
        }
    }

    /// Whether `additional` bytes fit on top of `used` bytes.
    #[must_use]
    pub fn fits(&self, used: u64, additional: u64) -> bool {
        used.checked_add(additional).is_some_and(|total| total <= self.max_space_bytes)
    }
}
