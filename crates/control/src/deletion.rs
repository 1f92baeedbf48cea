use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::try_join;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shardvault_audit::{AuditStore, OperationEvent};
use shardvault_core::{BucketId, File, FileId, FrameId, PointerId, SchemaVersion, ShardId};
use shardvault_reclaim::ReclamationDispatcher;
use shardvault_repository::Repositories;

use crate::error::ControlError;
use crate::ledger::QuotaLedger;

const BULK_DELETE: &str = "bulk_delete";

/// The delete path for both schema generations.
///
/// Every repository delete is "remove if present", so repeating a removal is
/// harmless for the records. The usage counter is not: callers must not
/// remove the same file twice concurrently.
pub struct DeletionEngine {
    repos: Repositories,
    dispatcher: Arc<ReclamationDispatcher>,
    ledger: QuotaLedger,
    audit: Option<Arc<dyn AuditStore>>,
}

impl DeletionEngine {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<ReclamationDispatcher>,
        audit: Option<Arc<dyn AuditStore>>,
    ) -> Self {
        Self {
            ledger: QuotaLedger::new(repos.clone()),
            repos,
            dispatcher,
            audit,
        }
    }

    /// Remove legacy files together with their frames, pointers and shards.
    ///
    /// Missing frames or pointers are tolerated: the file records are removed
    /// regardless and nothing else happens for them.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn remove_v1(&self, files: &[File]) -> Result<(), ControlError> {
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id.clone()).collect();
        let frame_ids: Vec<FrameId> = files.iter().filter_map(|f| f.frame.clone()).collect();

        let frames = if frame_ids.is_empty() {
            Vec::new()
        } else {
            self.repos.frames.find_frames(&frame_ids).await?
        };
        let pointer_ids: Vec<PointerId> = frames.iter().flat_map(|f| f.shards.clone()).collect();
        let pointers = if pointer_ids.is_empty() {
            Vec::new()
        } else {
            self.repos.pointers.find_pointers(&pointer_ids).await?
        };

        self.repos.files.delete_files(&file_ids).await?;

        if !frames.is_empty() {
            let found: Vec<FrameId> = frames.iter().map(|f| f.id.clone()).collect();
            self.repos.frames.delete_frames(&found).await?;
        }

        if pointers.is_empty() {
            debug!("no pointers found, nothing to reclaim");
            return Ok(());
        }

        let found: Vec<PointerId> = pointers.iter().map(|p| p.id.clone()).collect();
        let hashes: Vec<String> = pointers
            .iter()
            .map(|p| p.hash.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let shards = self.repos.shards.find_shards_by_hashes(&hashes).await?;
        try_join(
            self.repos.pointers.delete_pointers(&found),
            self.repos.shards.delete_shards_by_hashes(&hashes),
        )
        .await?;

        self.dispatcher.reclaim_by_content_hash(hashes, &shards);
        Ok(())
    }

    /// Remove current-schema files together with their links and shards.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn remove_v2(&self, files: &[File]) -> Result<(), ControlError> {
        let mut records_gone = false;
        self.cascade_v2(files, &mut records_gone).await
    }

    /// Body of [`remove_v2`](Self::remove_v2). `records_gone` is set once
    /// the file records are deleted, so callers can settle usage even when a
    /// later step fails.
    async fn cascade_v2(&self, files: &[File], records_gone: &mut bool) -> Result<(), ControlError> {
        let file_ids: Vec<FileId> = files.iter().map(|f| f.id.clone()).collect();

        let links = self.repos.links.find_links_by_files(&file_ids).await?;
        let shard_ids: Vec<ShardId> = links
            .iter()
            .map(|l| l.shard_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let shards = if shard_ids.is_empty() {
            Vec::new()
        } else {
            self.repos.shards.find_shards(&shard_ids).await?
        };

        let (files_deleted, last_access_deleted) = futures::join!(
            self.repos.files.delete_files(&file_ids),
            self.repos.last_access.delete_last_access(&file_ids),
        );
        files_deleted?;
        *records_gone = true;
        last_access_deleted?;

        if !links.is_empty() {
            let link_ids: Vec<_> = links.iter().map(|l| l.id.clone()).collect();
            self.repos.links.delete_links(&link_ids).await?;
        }

        if shards.is_empty() {
            debug!("no shards found, nothing to reclaim");
            return Ok(());
        }

        let found: Vec<ShardId> = shards.iter().map(|s| s.id.clone()).collect();
        self.repos.shards.delete_shards(&found).await?;
        self.dispatcher.reclaim_by_object_key(shards);
        Ok(())
    }

    /// Remove one file of either generation.
    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn remove_one(&self, file_id: &FileId) -> Result<(), ControlError> {
        let file = self.load_file(file_id).await?;
        self.remove_file(file).await
    }

    /// Remove a file after checking that `user_uuid` owns its bucket.
    #[instrument(skip(self), fields(bucket_id = %bucket_id, file_id = %file_id))]
    pub async fn remove_for_user(
        &self,
        bucket_id: &BucketId,
        file_id: &FileId,
        user_uuid: Uuid,
    ) -> Result<(), ControlError> {
        let bucket = self
            .repos
            .buckets
            .find_bucket(bucket_id)
            .await?
            .ok_or_else(|| ControlError::BucketNotFound(bucket_id.clone()))?;
        if !bucket.is_owned_by_uuid(user_uuid) {
            return Err(ControlError::BucketForbidden(bucket_id.clone()));
        }

        let file = self.load_file(file_id).await?;
        if &file.bucket != bucket_id {
            return Err(ControlError::FileNotFound(file_id.clone()));
        }
        self.remove_file(file).await
    }

    /// Remove every existing file among `file_ids`.
    ///
    /// Ids with no file are ignored. Returns the ids that were removed.
    #[instrument(skip_all, fields(requested = file_ids.len()))]
    pub async fn remove_many(&self, file_ids: &[FileId]) -> Result<Vec<FileId>, ControlError> {
        let mut removed = Vec::new();
        self.cascade(file_ids, &mut removed).await?;
        Ok(removed)
    }

    /// Best-effort variant of [`remove_many`](Self::remove_many) that never
    /// fails.
    ///
    /// Returns only the ids confirmed removed before any failure. A failure
    /// (error or panic) is reported to the audit sink as a single event
    /// carrying the error and the complete input.
    #[instrument(skip_all, fields(requested = file_ids.len()))]
    pub async fn bulk_delete(&self, file_ids: &[FileId]) -> Vec<FileId> {
        let mut confirmed = Vec::new();
        let outcome = AssertUnwindSafe(self.cascade(file_ids, &mut confirmed))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        if let Some(message) = failure {
            error!(error = %message, confirmed = confirmed.len(), "bulk delete stopped early");
            self.report_failure(&message, file_ids, &confirmed).await;
        }
        confirmed
    }

    async fn cascade(
        &self,
        file_ids: &[FileId],
        confirmed: &mut Vec<FileId>,
    ) -> Result<(), ControlError> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let files = self.repos.files.find_files(file_ids).await?;

        let mut legacy = Vec::new();
        let mut current = Vec::new();
        for file in files {
            match file.schema() {
                Ok(SchemaVersion::Legacy) => legacy.push(file),
                Ok(SchemaVersion::Current) => current.push(file),
                Err(e) => warn!(file_id = %file.id, error = %e, "skipping file with unknown schema"),
            }
        }

        let v1 = async {
            if legacy.is_empty() {
                Ok(())
            } else {
                self.remove_v1(&legacy).await
            }
        };
        let v2 = async {
            let mut records_gone = false;
            let result = if current.is_empty() {
                Ok(())
            } else {
                self.cascade_v2(&current, &mut records_gone).await
            };
            (records_gone, result)
        };
        let (v1, (v2_records_gone, v2)) = futures::join!(v1, v2);

        if v1.is_ok() {
            confirmed.extend(legacy.iter().map(|f| f.id.clone()));
        }
        if v2.is_ok() {
            confirmed.extend(current.iter().map(|f| f.id.clone()));
        }

        // Deleted records must give their bytes back even if the other
        // partition or a later v2 step failed.
        let released = if v2_records_gone {
            self.ledger.release_files(&current).await
        } else {
            Ok(())
        };
        v1?;
        v2?;
        released?;

        info!(legacy = legacy.len(), current = current.len(), "files removed");
        Ok(())
    }

    async fn remove_file(&self, file: File) -> Result<(), ControlError> {
        match file.schema()? {
            SchemaVersion::Legacy => self.remove_v1(std::slice::from_ref(&file)).await,
            SchemaVersion::Current => {
                self.release_owner_usage(&file).await?;
                self.remove_v2(std::slice::from_ref(&file)).await
            }
        }
    }

    /// Decrement the owner's counter by the file's size. A missing bucket or
    /// owner skips the adjustment.
    async fn release_owner_usage(&self, file: &File) -> Result<(), ControlError> {
        let Some(bucket) = self.repos.buckets.find_bucket(&file.bucket).await? else {
            warn!(file_id = %file.id, bucket_id = %file.bucket, "bucket missing, usage not released");
            return Ok(());
        };
        let Some(owner) = self.repos.users.find_user(&bucket.owner_id).await? else {
            warn!(file_id = %file.id, user_id = %bucket.owner_id, "owner missing, usage not released");
            return Ok(());
        };
        self.ledger.release(&owner.id, file.size).await?;
        Ok(())
    }

    async fn load_file(&self, file_id: &FileId) -> Result<File, ControlError> {
        self.repos
            .files
            .find_file(file_id)
            .await?
            .ok_or_else(|| ControlError::FileNotFound(file_id.clone()))
    }

    async fn report_failure(&self, message: &str, input: &[FileId], confirmed: &[FileId]) {
        let Some(audit) = &self.audit else {
            warn!("no audit sink configured, bulk delete failure not recorded");
            return;
        };
        let event = OperationEvent::failure(
            BULK_DELETE,
            message,
            input.iter().map(ToString::to_string).collect(),
            confirmed.iter().map(ToString::to_string).collect(),
        );
        if let Err(e) = audit.record(event).await {
            error!(error = %e, "failed to record bulk delete failure");
        }
    }
}

impl std::fmt::Debug for DeletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionEngine")
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        String::from("panic with non-string payload")
    }
}
