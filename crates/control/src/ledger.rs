use std::collections::{BTreeSet, HashMap};

use futures::future::try_join_all;
use tracing::{debug, warn};

use shardvault_core::{BucketId, File, SchemaVersion, User, UserId};
use shardvault_repository::{Repositories, RepositoryError};

use crate::error::ControlError;

/// Reads and adjusts the per-user usage counter.
///
/// For users still carrying legacy files (`usage_migrated == false`) the
/// counter does not include those files, so capacity checks add a scan of
/// the user's legacy file sizes.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    repos: Repositories,
}

impl QuotaLedger {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Bytes the user currently occupies.
    pub async fn usage(&self, user: &User) -> Result<u64, ControlError> {
        if user.usage_migrated {
            return Ok(user.total_used_space_bytes);
        }
        let legacy = self.legacy_usage(&user.id).await?;
        debug!(user_id = %user.id, legacy, "added legacy usage scan");
        Ok(user.total_used_space_bytes.saturating_add(legacy))
    }

    /// Load the user fresh and check that `additional` bytes fit.
    ///
    /// Returns the loaded user on success.
    pub async fn ensure_capacity(
        &self,
        user_id: &UserId,
        additional: u64,
    ) -> Result<User, ControlError> {
        let user = self
            .repos
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ControlError::UserNotFound(user_id.to_string()))?;
        let used = self.usage(&user).await?;
        if user.fits(used, additional) {
            Ok(user)
        } else {
            Err(ControlError::QuotaExceeded {
                requested: additional,
                available: user.max_space_bytes.saturating_sub(used),
            })
        }
    }

    /// Add `bytes` to the user's counter.
    pub async fn charge(&self, user_id: &UserId, bytes: u64) -> Result<u64, ControlError> {
        let delta = i64::try_from(bytes).unwrap_or(i64::MAX);
        Ok(self.repos.users.adjust_used_space(user_id, delta).await?)
    }

    /// Subtract `bytes` from the user's counter.
    pub async fn release(&self, user_id: &UserId, bytes: u64) -> Result<u64, ControlError> {
        let delta = i64::try_from(bytes).map_or(i64::MIN, |b| -b);
        Ok(self.repos.users.adjust_used_space(user_id, delta).await?)
    }

    /// Release the sizes of current-schema `files`, one write per owning user.
    ///
    /// Files whose bucket no longer exists, and owners that no longer exist,
    /// are skipped.
    pub async fn release_files(&self, files: &[File]) -> Result<(), ControlError> {
        if files.is_empty() {
            return Ok(());
        }
        let bucket_ids: Vec<BucketId> = files
            .iter()
            .map(|f| f.bucket.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let owners: HashMap<BucketId, UserId> = self
            .repos
            .buckets
            .find_buckets(&bucket_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b.owner_id))
            .collect();

        let mut per_user: HashMap<UserId, u64> = HashMap::new();
        for file in files {
            match owners.get(&file.bucket) {
                Some(owner) => {
                    let total = per_user.entry(owner.clone()).or_default();
                    *total = total.saturating_add(file.size);
                }
                None => {
                    warn!(file_id = %file.id, bucket_id = %file.bucket, "bucket missing, usage not released");
                }
            }
        }

        try_join_all(per_user.iter().map(|(user_id, bytes)| async move {
            match self.release(user_id, *bytes).await {
                Err(ControlError::Repository(RepositoryError::NotFound(_))) => {
                    warn!(user_id = %user_id, bytes, "user missing, usage not released");
                    Ok(())
                }
                other => other.map(|_| ()),
            }
        }))
        .await?;
        Ok(())
    }

    async fn legacy_usage(&self, user_id: &UserId) -> Result<u64, ControlError> {
        let buckets: Vec<BucketId> = self
            .repos
            .buckets
            .find_buckets_by_owner(user_id)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        if buckets.is_empty() {
            return Ok(0);
        }
        let files = self.repos.files.find_files_in_buckets(&buckets).await?;
        Ok(files
            .iter()
            .filter(|f| matches!(f.schema(), Ok(SchemaVersion::Legacy)))
            .fold(0u64, |sum, f| sum.saturating_add(f.size)))
    }
}
