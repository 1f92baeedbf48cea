use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use shardvault_core::{
    Bucket, BucketId, File, FileShardLink, Mirror, Node, NodeId, PendingUpload,
    ReplicationContract, Shard, ShardCommit, ShardId, ShardRequest, User, disambiguate_hash,
};
use shardvault_node::NodeClient;
use shardvault_repository::{Repositories, RepositoryError};

use crate::config::UploadPolicy;
use crate::error::ControlError;
use crate::ledger::QuotaLedger;
use crate::selector::pick_node;

/// Where the client should write one admitted shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WriteTarget {
    Single {
        url: String,
    },
    Multipart {
        urls: Vec<String>,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Result of admitting one shard request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmittedShard {
    pub index: u32,
    pub object_key: String,
    #[serde(flatten)]
    pub target: WriteTarget,
}

/// A committed shard together with the nodes that confirmed holding it.
struct ConfirmedShard {
    upload: PendingUpload,
    hash: String,
    nodes: Vec<Node>,
}

/// The write path: storage negotiation, quota enforcement, replication
/// confirmation and bookkeeping.
pub struct UploadOrchestrator {
    repos: Repositories,
    nodes: Arc<dyn NodeClient>,
    ledger: QuotaLedger,
    policy: UploadPolicy,
}

impl UploadOrchestrator {
    pub fn new(repos: Repositories, nodes: Arc<dyn NodeClient>, policy: UploadPolicy) -> Self {
        Self {
            ledger: QuotaLedger::new(repos.clone()),
            repos,
            nodes,
            policy,
        }
    }

    /// Negotiate storage for each shard request and hand back write targets.
    ///
    /// `part_count` greater than one requests multipart targets and is only
    /// allowed when the total requested size reaches
    /// [`UploadPolicy::multipart_min_bytes`].
    ///
    /// A request `index` is the shard's position within the file. Opaque
    /// client-side identifiers, such as a 64 character hex file index, go to
    /// [`commit_upload`](Self::commit_upload) as `file_index` instead.
    #[instrument(skip_all, fields(user_id = %user.id, bucket_id = %bucket_id, shards = requests.len()))]
    pub async fn admit_upload(
        &self,
        user: &User,
        bucket_id: &BucketId,
        node_pool: &[NodeId],
        requests: &[ShardRequest],
        part_count: u32,
    ) -> Result<Vec<AdmittedShard>, ControlError> {
        let mut seen = HashSet::new();
        if !requests.iter().all(|r| seen.insert(r.index)) {
            return Err(ControlError::InvalidUploadIndices);
        }

        let total = requests
            .iter()
            .fold(0u64, |sum, r| sum.saturating_add(r.size));
        if part_count == 0 {
            return Err(ControlError::InvalidMultipartValue(
                "part count must be at least 1".into(),
            ));
        }
        if part_count > 1 && total < self.policy.multipart_min_bytes {
            return Err(ControlError::InvalidMultipartValue(format!(
                "multipart requires at least {} bytes, got {total}",
                self.policy.multipart_min_bytes
            )));
        }

        self.owned_bucket(user, bucket_id).await?;
        self.ledger.ensure_capacity(&user.id, total).await?;

        let admitted = try_join_all(
            requests
                .iter()
                .map(|request| self.admit_one(*request, node_pool, part_count)),
        )
        .await?;

        info!(total, "upload admitted");
        Ok(admitted)
    }

    async fn admit_one(
        &self,
        request: ShardRequest,
        node_pool: &[NodeId],
        part_count: u32,
    ) -> Result<AdmittedShard, ControlError> {
        let node_id = pick_node(node_pool)?;
        let contract = ReplicationContract::new(node_id.clone(), request.size);
        let upload = PendingUpload::new(request, contract);
        self.repos.uploads.create_upload(upload.clone()).await?;

        let node = self
            .repos
            .nodes
            .find_node(&node_id)
            .await?
            .ok_or(ControlError::NodeNotFound(node_id))?;

        let target = if part_count > 1 {
            let multipart = self
                .nodes
                .request_multipart_urls(&node, &upload.object_key, part_count)
                .await?;
            WriteTarget::Multipart {
                urls: multipart.urls,
                session_id: multipart.session_id,
            }
        } else {
            WriteTarget::Single {
                url: self
                    .nodes
                    .request_upload_url(&node, &upload.object_key)
                    .await?,
            }
        };

        debug!(index = request.index, node_id = %node.id, object_key = %upload.object_key, "shard admitted");
        Ok(AdmittedShard {
            index: request.index,
            object_key: upload.object_key,
            target,
        })
    }

    /// Confirm the client's writes and record the new file.
    ///
    /// Nothing is written unless every shard was confirmed by at least one
    /// node. The usage counter is charged only after every record exists.
    #[instrument(skip_all, fields(user_id = %user.id, bucket_id = %bucket_id, shards = commits.len()))]
    pub async fn commit_upload(
        &self,
        user: &User,
        bucket_id: &BucketId,
        file_index: impl Into<String>,
        commits: Vec<ShardCommit>,
    ) -> Result<File, ControlError> {
        self.owned_bucket(user, bucket_id).await?;

        let keys: Vec<String> = commits.iter().map(|c| c.object_key.clone()).collect();
        let mut uploads: HashMap<String, PendingUpload> = self
            .repos
            .uploads
            .find_uploads_by_object_keys(&keys)
            .await?
            .into_iter()
            .map(|u| (u.object_key.clone(), u))
            .collect();
        if uploads.len() != commits.len() {
            return Err(ControlError::MissingUploads {
                expected: commits.len(),
                found: uploads.len(),
            });
        }
        let mut paired = Vec::with_capacity(commits.len());
        for commit in &commits {
            let Some(upload) = uploads.remove(&commit.object_key) else {
                return Err(ControlError::MissingUploads {
                    expected: commits.len(),
                    found: paired.len(),
                });
            };
            paired.push((commit, upload));
        }

        let total = paired
            .iter()
            .fold(0u64, |sum, (_, u)| sum.saturating_add(u.size));
        if let Err(e) = self.ledger.ensure_capacity(&user.id, total).await {
            if matches!(e, ControlError::QuotaExceeded { .. }) {
                self.abort_multipart(&paired).await;
            }
            return Err(e);
        }

        let confirmed = try_join_all(
            paired
                .into_iter()
                .map(|(commit, upload)| self.confirm_shard(commit, upload)),
        )
        .await?;

        let file = File::current(bucket_id.clone(), file_index, total);
        let mut writes: Vec<BoxFuture<'_, Result<(), RepositoryError>>> = Vec::new();
        let mut upload_ids = Vec::with_capacity(confirmed.len());
        for shard in confirmed {
            let contracts: Vec<ReplicationContract> = shard
                .nodes
                .iter()
                .map(|n| {
                    ReplicationContract::new(n.id.clone(), shard.upload.size).with_hash(&shard.hash)
                })
                .collect();
            for contract in &contracts {
                writes.push(
                    self.repos
                        .mirrors
                        .create_mirror(Mirror::established(&shard.hash, contract.clone())),
                );
            }
            let record = Shard {
                id: ShardId::generate(),
                hash: shard.hash,
                object_key: shard.upload.object_key.clone(),
                size: shard.upload.size,
                contracts,
            };
            writes.push(self.repos.links.create_link(FileShardLink::new(
                file.id.clone(),
                record.id.clone(),
                shard.upload.index,
            )));
            writes.push(self.repos.shards.create_shard(record));
            upload_ids.push(shard.upload.id);
        }
        writes.push(self.repos.files.create_file(file.clone()));
        try_join_all(writes).await?;

        self.ledger.charge(&user.id, file.size).await?;

        if let Err(e) = self.repos.uploads.delete_uploads(&upload_ids).await {
            warn!(error = %e, count = upload_ids.len(), "failed to delete consumed pending uploads");
        }

        info!(file_id = %file.id, size = file.size, "upload committed");
        Ok(file)
    }

    async fn confirm_shard(
        &self,
        commit: &ShardCommit,
        upload: PendingUpload,
    ) -> Result<ConfirmedShard, ControlError> {
        let hash = disambiguate_hash(&commit.hash);
        let candidates = self.candidate_nodes(&upload).await?;

        if let Some(session_id) = &commit.session_id {
            let parts = commit.parts.as_deref().unwrap_or_default();
            for node in &candidates {
                if let Err(e) = self
                    .nodes
                    .finalize_multipart(node, &upload.object_key, session_id, parts)
                    .await
                {
                    warn!(node_id = %node.id, object_key = %upload.object_key, error = %e, "multipart finalize failed");
                }
            }
        }

        let key = upload.object_key.as_str();
        let probes = candidates.iter().map(|node| async move {
            if node.trusted {
                return true;
            }
            match self.nodes.object_exists(node, key).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(node_id = %node.id, object_key = key, error = %e, "existence probe failed");
                    false
                }
            }
        });
        let answers = join_all(probes).await;
        let nodes: Vec<Node> = candidates
            .into_iter()
            .zip(answers)
            .filter_map(|(node, ok)| ok.then_some(node))
            .collect();

        if nodes.is_empty() {
            warn!(object_key = %upload.object_key, "no node confirmed the shard");
            return Err(ControlError::ShardNotStored(upload.object_key));
        }
        Ok(ConfirmedShard {
            upload,
            hash,
            nodes,
        })
    }

    async fn candidate_nodes(&self, upload: &PendingUpload) -> Result<Vec<Node>, ControlError> {
        let ids: Vec<NodeId> = upload.contracts.iter().map(|c| c.node_id.clone()).collect();
        let nodes = self.repos.nodes.find_nodes(&ids).await?;
        if nodes.len() < ids.len() {
            warn!(object_key = %upload.object_key, "some candidate nodes are no longer registered");
        }
        Ok(nodes)
    }

    /// Release remote multipart sessions of a commit that is being rejected.
    async fn abort_multipart(&self, paired: &[(&ShardCommit, PendingUpload)]) {
        for (commit, upload) in paired {
            let Some(session_id) = &commit.session_id else {
                continue;
            };
            let candidates = match self.candidate_nodes(upload).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(object_key = %upload.object_key, error = %e, "cannot resolve nodes to abort multipart");
                    continue;
                }
            };
            for node in &candidates {
                if let Err(e) = self
                    .nodes
                    .abort_multipart(node, &upload.object_key, session_id)
                    .await
                {
                    warn!(node_id = %node.id, object_key = %upload.object_key, error = %e, "multipart abort failed");
                }
            }
        }
    }

    async fn owned_bucket(&self, user: &User, bucket_id: &BucketId) -> Result<Bucket, ControlError> {
        let bucket = self
            .repos
            .buckets
            .find_bucket(bucket_id)
            .await?
            .ok_or_else(|| ControlError::BucketNotFound(bucket_id.clone()))?;
        if !bucket.is_owned_by(&user.id) {
            return Err(ControlError::BucketForbidden(bucket_id.clone()));
        }
        Ok(bucket)
    }
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn admitted_shard_wire_shape() {
        let single = AdmittedShard {
            index: 0,
            object_key: "k".into(),
            target: WriteTarget::Single { url: "u".into() },
        };
        assert_eq!(
            serde_json::to_value(&single).unwrap(),
            json!({"index": 0, "objectKey": "k", "url": "u"})
        );

        let multi = AdmittedShard {
            index: 1,
            object_key: "k".into(),
            target: WriteTarget::Multipart {
                urls: vec!["a".into(), "b".into()],
                session_id: "s".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&multi).unwrap(),
            json!({"index": 1, "objectKey": "k", "urls": ["a", "b"], "sessionId": "s"})
        );
    }
}
