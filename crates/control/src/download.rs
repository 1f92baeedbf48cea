use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use shardvault_core::{FileId, FileShardLink, Mirror, SchemaVersion, Shard, content_hash};
use shardvault_node::NodeClient;
use shardvault_repository::Repositories;

use crate::error::ControlError;

/// Where to read one shard of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardLocation {
    pub index: u32,
    /// Content hash, without any session prefix.
    pub hash: String,
    pub size: u64,
    pub url: String,
}

/// Resolves read URLs for the shards of a current-schema file.
pub struct DownloadResolver {
    repos: Repositories,
    nodes: Arc<dyn NodeClient>,
}

impl DownloadResolver {
    pub fn new(repos: Repositories, nodes: Arc<dyn NodeClient>) -> Self {
        Self { repos, nodes }
    }

    /// One location per shard, in shard index order.
    ///
    /// Shards with no established mirror have mirrors rebuilt from their
    /// contracts before a node is chosen.
    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn resolve(&self, file_id: &FileId) -> Result<Vec<ShardLocation>, ControlError> {
        let file = self
            .repos
            .files
            .find_file(file_id)
            .await?
            .ok_or_else(|| ControlError::FileNotFound(file_id.clone()))?;
        if file.schema()? == SchemaVersion::Legacy {
            return Err(ControlError::LegacyDownloadUnsupported(file_id.clone()));
        }

        let mut links = self
            .repos
            .links
            .find_links_by_files(std::slice::from_ref(file_id))
            .await?;
        links.sort_by_key(|l| l.index);
        let shard_ids: Vec<_> = links.iter().map(|l| l.shard_id.clone()).collect();
        let shards = self.repos.shards.find_shards(&shard_ids).await?;

        let locations = try_join_all(links.iter().map(|link| {
            let shard = shards.iter().find(|s| s.id == link.shard_id);
            self.locate(link, shard)
        }))
        .await?;

        if let Err(e) = self
            .repos
            .last_access
            .touch_last_access(file_id, Utc::now())
            .await
        {
            warn!(error = %e, "failed to record last access");
        }
        Ok(locations)
    }

    async fn locate(
        &self,
        link: &FileShardLink,
        shard: Option<&Shard>,
    ) -> Result<ShardLocation, ControlError> {
        let shard = shard.ok_or_else(|| ControlError::ShardNotFound(link.shard_id.clone()))?;
        let mirrors = self.mirrors(shard).await?;

        let mirror = mirrors
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ControlError::NoMirrors(shard.object_key.clone()))?;
        let node = self
            .repos
            .nodes
            .find_node(&mirror.node_id)
            .await?
            .ok_or_else(|| ControlError::NodeNotFound(mirror.node_id.clone()))?;
        let url = self
            .nodes
            .request_download_url(&node, &shard.object_key)
            .await?;

        Ok(ShardLocation {
            index: link.index,
            hash: content_hash(&shard.hash).to_owned(),
            size: shard.size,
            url,
        })
    }

    /// Established mirrors of `shard`, rebuilding them from the shard's
    /// contracts when none exist.
    async fn mirrors(&self, shard: &Shard) -> Result<Vec<Mirror>, ControlError> {
        let established: Vec<Mirror> = self
            .repos
            .mirrors
            .find_mirrors_by_hashes(std::slice::from_ref(&shard.hash))
            .await?
            .into_iter()
            .filter(|m| m.is_established)
            .collect();
        if !established.is_empty() {
            return Ok(established);
        }

        let rebuilt: Vec<Mirror> = shard
            .contracts
            .iter()
            .map(|c| Mirror::established(&shard.hash, c.clone()))
            .collect();
        for mirror in &rebuilt {
            self.repos.mirrors.create_mirror(mirror.clone()).await?;
        }
        debug!(object_key = %shard.object_key, count = rebuilt.len(), "rebuilt mirrors from contracts");
        Ok(rebuilt)
    }
}

impl std::fmt::Debug for DownloadResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadResolver").finish_non_exhaustive()
    }
}
