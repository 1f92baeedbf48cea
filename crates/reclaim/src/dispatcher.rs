use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use shardvault_channel::{ChannelMessage, DeleteShardPayload, MessageChannel};
use shardvault_core::{Mirror, MirrorId, Node, NodeId, SchemaVersion, Shard};
use shardvault_node::urls;
use shardvault_repository::Repositories;

/// One shard whose copies must be freed.
#[derive(Debug, Clone)]
struct Target {
    /// Content hash, as recorded on mirrors.
    hash: String,
    /// Identifier sent to the node: object key (current) or hash (legacy).
    key: String,
    /// Nodes named by the shard itself, used when no mirror is recorded.
    fallback_nodes: Vec<NodeId>,
}

struct Inner {
    repos: Repositories,
    channel: Arc<dyn MessageChannel>,
    stream: String,
}

/// Publishes one `DELETE_SHARD` message per (shard, node) pair.
///
/// Both entry points return immediately; the work runs on a tracked task and
/// failures are only logged, since they delay space reclamation on a node
/// but never affect the bookkeeping being removed by the caller. Call
/// [`drain`](Self::drain) to wait for in-flight work.
pub struct ReclamationDispatcher {
    inner: Arc<Inner>,
    tracker: TaskTracker,
}

impl ReclamationDispatcher {
    pub fn new(
        repos: Repositories,
        channel: Arc<dyn MessageChannel>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repos,
                channel,
                stream: stream.into(),
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Free current-generation shards, addressed by node-local object key.
    pub fn reclaim_by_object_key(&self, shards: Vec<Shard>) {
        if shards.is_empty() {
            return;
        }
        let targets = shards
            .into_iter()
            .map(|shard| Target {
                fallback_nodes: shard.node_ids().cloned().collect(),
                key: shard.object_key,
                hash: shard.hash,
            })
            .collect();
        self.spawn(targets, SchemaVersion::Current);
    }

    /// Free legacy-generation shards, addressed by content hash.
    ///
    /// `shards` are the shard records that carried those hashes; their
    /// contracts are used when no mirror is recorded for a hash.
    pub fn reclaim_by_content_hash(&self, hashes: Vec<String>, shards: &[Shard]) {
        if hashes.is_empty() {
            return;
        }
        let mut contracts: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for shard in shards {
            contracts
                .entry(shard.hash.as_str())
                .or_default()
                .extend(shard.node_ids().cloned());
        }
        let targets = hashes
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|hash| Target {
                hash: hash.clone(),
                key: hash.clone(),
                fallback_nodes: contracts.get(hash.as_str()).cloned().unwrap_or_default(),
            })
            .collect();
        self.spawn(targets, SchemaVersion::Legacy);
    }

    /// Wait until every notification spawned so far has been handled.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn spawn(&self, targets: Vec<Target>, generation: SchemaVersion) {
        let inner = Arc::clone(&self.inner);
        self.tracker.spawn(async move {
            inner.dispatch(targets, generation).await;
        });
    }
}

impl std::fmt::Debug for ReclamationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclamationDispatcher")
            .field("stream", &self.inner.stream)
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    #[instrument(skip_all, fields(targets = targets.len(), ?generation))]
    async fn dispatch(&self, targets: Vec<Target>, generation: SchemaVersion) {
        let hashes: Vec<String> = targets.iter().map(|t| t.hash.clone()).collect();
        let mirrors = match self.repos.mirrors.find_mirrors_by_hashes(&hashes).await {
            Ok(mirrors) => mirrors,
            Err(e) => {
                warn!(error = %e, "mirror lookup failed, using shard contracts");
                Vec::new()
            }
        };

        let mut by_hash: HashMap<&str, Vec<&Mirror>> = HashMap::new();
        for mirror in &mirrors {
            by_hash.entry(mirror.shard_hash.as_str()).or_default().push(mirror);
        }

        let mut consumed: Vec<MirrorId> = Vec::new();
        let mut pairs: Vec<(&Target, NodeId)> = Vec::new();
        for target in &targets {
            match by_hash.get(target.hash.as_str()) {
                Some(found) if !found.is_empty() => {
                    for mirror in found {
                        consumed.push(mirror.id.clone());
                        pairs.push((target, mirror.node_id.clone()));
                    }
                }
                _ => {
                    debug!(hash = %target.hash, "no mirrors recorded, using shard contracts");
                    pairs.extend(target.fallback_nodes.iter().map(|n| (target, n.clone())));
                }
            }
        }

        let nodes = self.resolve_nodes(&pairs).await;
        let publishes = pairs.iter().filter_map(|(target, node_id)| {
            let Some(node) = nodes.get(node_id) else {
                warn!(node_id = %node_id, key = %target.key, "node not found, skipping");
                return None;
            };
            Some(self.notify(target, node, generation))
        });
        let results = join_all(publishes).await;
        let published = results.iter().filter(|ok| **ok).count();

        if !consumed.is_empty() {
            if let Err(e) = self.repos.mirrors.delete_mirrors(&consumed).await {
                warn!(error = %e, count = consumed.len(), "failed to delete consumed mirrors");
            }
        }

        info!(
            published,
            failed = results.len() - published,
            mirrors_consumed = consumed.len(),
            "reclamation dispatched"
        );
    }

    async fn resolve_nodes(&self, pairs: &[(&Target, NodeId)]) -> HashMap<NodeId, Node> {
        let ids: Vec<NodeId> = pairs
            .iter()
            .map(|(_, id)| id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return HashMap::new();
        }
        match self.repos.nodes.find_nodes(&ids).await {
            Ok(nodes) => nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            Err(e) => {
                warn!(error = %e, "node lookup failed, nothing to notify");
                HashMap::new()
            }
        }
    }

    async fn notify(&self, target: &Target, node: &Node, generation: SchemaVersion) -> bool {
        let payload = match generation {
            SchemaVersion::Current => DeleteShardPayload::by_object_key(
                &target.key,
                urls::delete_by_object_key(node, &target.key),
            ),
            SchemaVersion::Legacy => DeleteShardPayload::by_content_hash(
                &target.key,
                urls::delete_by_content_hash(node, &target.key),
            ),
        };
        let message = ChannelMessage::delete_shard(payload);
        match self.channel.publish(&self.stream, &message).await {
            Ok(id) => {
                debug!(node_id = %node.id, key = %target.key, id = %id, "deletion queued");
                true
            }
            Err(e) => {
                warn!(node_id = %node.id, key = %target.key, error = %e, "failed to queue deletion");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use shardvault_channel::MemoryChannel;
    use shardvault_core::{ReplicationContract, ShardId};
    use shardvault_repository::{MirrorRepository, NodeRepository};
    use shardvault_repository_memory::{FaultPlan, MemoryRepository};

    use super::*;

    const STREAM: &str = "reclaim";

    struct Fixture {
        repo: Arc<MemoryRepository>,
        channel: Arc<MemoryChannel>,
        dispatcher: ReclamationDispatcher,
    }

    async fn fixture_with(repo: MemoryRepository, channel: MemoryChannel) -> Fixture {
        let repo = Arc::new(repo);
        let channel = Arc::new(channel);
        let dispatcher = ReclamationDispatcher::new(
            Repositories::from_backend(Arc::clone(&repo)),
            Arc::clone(&channel) as Arc<dyn MessageChannel>,
            STREAM,
        );
        for (id, port) in [("n1", 1001), ("n2", 1002), ("n3", 1003)] {
            repo.create_node(Node::new(id, "host", port)).await.unwrap();
        }
        Fixture {
            repo,
            channel,
            dispatcher,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MemoryRepository::new(), MemoryChannel::new()).await
    }

    fn shard(hash: &str, key: &str, nodes: &[&str]) -> Shard {
        Shard {
            id: ShardId::generate(),
            hash: hash.into(),
            object_key: key.into(),
            size: 1,
            contracts: nodes
                .iter()
                .map(|n| ReplicationContract::new(NodeId::new(*n), 1))
                .collect(),
        }
    }

    fn payloads(channel: &MemoryChannel) -> Vec<DeleteShardPayload> {
        channel
            .published(STREAM)
            .into_iter()
            .filter_map(|m| match m {
                ChannelMessage::DeleteShard(p) => Some(p),
                ChannelMessage::QuotaChanged(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn mirrors_drive_notifications_and_are_consumed() {
        let f = fixture().await;
        for node in ["n1", "n2"] {
            f.repo
                .create_mirror(Mirror::established(
                    "h1",
                    ReplicationContract::new(NodeId::new(node), 1),
                ))
                .await
                .unwrap();
        }

        f.dispatcher
            .reclaim_by_object_key(vec![shard("h1", "key-1", &["n3"])]);
        f.dispatcher.drain().await;

        let mut urls: Vec<String> = payloads(&f.channel).into_iter().map(|p| p.url).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "http://host:1001/v2/shards/key-1",
                "http://host:1002/v2/shards/key-1"
            ]
        );
        assert!(f.repo.mirrors_snapshot().is_empty());
    }

    #[tokio::test]
    async fn missing_mirrors_fall_back_to_contracts() {
        let f = fixture().await;
        f.dispatcher
            .reclaim_by_object_key(vec![shard("h1", "key-1", &["n3"])]);
        f.dispatcher.drain().await;

        let sent = payloads(&f.channel);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key.as_deref(), Some("key-1"));
        assert_eq!(sent[0].url, "http://host:1003/v2/shards/key-1");
    }

    #[tokio::test]
    async fn legacy_generation_uses_hash_endpoint() {
        let f = fixture().await;
        let shards = vec![shard("abc", "ignored", &["n1", "n2"])];
        f.dispatcher
            .reclaim_by_content_hash(vec!["abc".into(), "abc".into()], &shards);
        f.dispatcher.drain().await;

        let sent = payloads(&f.channel);
        assert_eq!(sent.len(), 2);
        for payload in &sent {
            assert_eq!(payload.hash.as_deref(), Some("abc"));
            assert!(payload.key.is_none());
            assert!(payload.url.ends_with("/shards/abc"));
            assert!(!payload.url.contains("/v2/"));
        }
    }

    #[tokio::test]
    async fn unknown_nodes_are_skipped() {
        let f = fixture().await;
        f.dispatcher
            .reclaim_by_object_key(vec![shard("h", "k", &["ghost", "n1"])]);
        f.dispatcher.drain().await;
        assert_eq!(payloads(&f.channel).len(), 1);
    }

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let f = fixture_with(MemoryRepository::new(), MemoryChannel::unconnected()).await;
        f.dispatcher
            .reclaim_by_object_key(vec![shard("h", "k", &["n1"])]);
        f.dispatcher.drain().await;
        assert!(f.channel.published(STREAM).is_empty());
    }

    #[tokio::test]
    async fn mirror_lookup_failure_falls_back_to_contracts() {
        // Calls 1-3 create the nodes; call 4 is the mirror lookup.
        let f = fixture_with(
            MemoryRepository::with_faults(FaultPlan::OnCall(4)),
            MemoryChannel::new(),
        )
        .await;
        f.dispatcher
            .reclaim_by_object_key(vec![shard("h", "k", &["n2"])]);
        f.dispatcher.drain().await;

        let sent = payloads(&f.channel);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://host:1002/v2/shards/k");
    }

    #[tokio::test]
    async fn empty_input_spawns_nothing() {
        let f = fixture().await;
        f.dispatcher.reclaim_by_object_key(Vec::new());
        f.dispatcher.reclaim_by_content_hash(Vec::new(), &[]);
        f.dispatcher.drain().await;
        assert!(f.channel.published(STREAM).is_empty());
    }

    #[tokio::test]
    async fn dispatcher_is_usable_after_drain() {
        let f = fixture().await;
        f.dispatcher.drain().await;
        f.dispatcher
            .reclaim_by_object_key(vec![shard("h", "k", &["n1"])]);
        f.dispatcher.drain().await;
        assert_eq!(payloads(&f.channel).len(), 1);
    }
}
