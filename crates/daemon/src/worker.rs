use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use shardvault_channel::{ChannelError, ChannelMessage, MessageChannel, StreamEntry};
use shardvault_node::{NodeClient, NodeError};

use crate::config::ReclaimerSection;

/// Consumes deletion notifications and forwards them to storage nodes.
///
/// An entry is acknowledged once the node confirmed the delete or reported
/// the object as already gone. Any other failure leaves the entry pending in
/// the consumer group; each poll replays the consumer's pending entries
/// before reading new ones, so a failed delete is retried about once per
/// `block` interval.
pub struct Reclaimer {
    channel: Arc<dyn MessageChannel>,
    nodes: Arc<dyn NodeClient>,
    stream: String,
    group: String,
    consumer: String,
    batch_size: usize,
    block: Duration,
}

impl Reclaimer {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        nodes: Arc<dyn NodeClient>,
        stream: impl Into<String>,
        config: &ReclaimerSection,
    ) -> Self {
        Self {
            channel,
            nodes,
            stream: stream.into(),
            group: config.group.clone(),
            consumer: config.consumer.clone(),
            batch_size: config.batch_size,
            block: Duration::from_millis(config.block_ms),
        }
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), ChannelError> {
        self.channel.ensure_group(&self.stream, &self.group).await?;
        info!(stream = %self.stream, group = %self.group, consumer = %self.consumer, "reclaimer started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                polled = self.poll_once() => {
                    if let Err(e) = polled {
                        warn!(error = %e, "reclaimer poll failed");
                        tokio::time::sleep(self.block).await;
                    }
                }
            }
        }

        info!("reclaimer stopped");
        Ok(())
    }

    /// Replay this consumer's pending entries, then read new ones. Returns
    /// the number of acknowledged entries.
    pub async fn poll_once(&self) -> Result<usize, ChannelError> {
        let mut entries = self
            .channel
            .read_pending(&self.stream, &self.group, &self.consumer, self.batch_size)
            .await?;
        let retried = entries.len();
        entries.extend(
            self.channel
                .read_group(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    self.batch_size,
                    self.block,
                )
                .await?,
        );
        if entries.is_empty() {
            return Ok(0);
        }

        let mut done = Vec::with_capacity(entries.len());
        for entry in &entries {
            if self.handle(entry).await {
                done.push(entry.id.clone());
            }
        }
        if !done.is_empty() {
            self.channel.ack(&self.stream, &self.group, &done).await?;
        }
        debug!(read = entries.len(), retried, acked = done.len(), "reclaimer batch handled");
        Ok(done.len())
    }

    async fn handle(&self, entry: &StreamEntry) -> bool {
        let ChannelMessage::DeleteShard(payload) = &entry.message else {
            debug!(id = %entry.id, "ignoring non-deletion message");
            return true;
        };
        match self.nodes.delete_object(&payload.url).await {
            Ok(()) => {
                debug!(id = %entry.id, url = %payload.url, "shard deleted");
                true
            }
            Err(NodeError::ObjectNotFound(_)) => {
                debug!(id = %entry.id, url = %payload.url, "shard already gone");
                true
            }
            Err(e) => {
                warn!(id = %entry.id, url = %payload.url, error = %e, retryable = e.is_retryable(), "shard delete failed, leaving pending");
                false
            }
        }
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("stream", &self.stream)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use shardvault_channel::{DeleteShardPayload, MemoryChannel};
    use shardvault_core::UserId;
    use shardvault_node::testing::{FakeNodeClient, NodeCall};

    use super::*;

    const STREAM: &str = "reclaim";
    const GROUP: &str = "reclaimers";

    struct Fixture {
        channel: Arc<MemoryChannel>,
        nodes: Arc<FakeNodeClient>,
        reclaimer: Reclaimer,
    }

    async fn fixture(block_ms: u64) -> Fixture {
        let channel = Arc::new(MemoryChannel::new());
        let nodes = Arc::new(FakeNodeClient::new());
        let config = ReclaimerSection {
            block_ms,
            ..ReclaimerSection::default()
        };
        let reclaimer = Reclaimer::new(
            Arc::clone(&channel) as Arc<dyn MessageChannel>,
            Arc::clone(&nodes) as Arc<dyn NodeClient>,
            STREAM,
            &config,
        );
        channel.ensure_group(STREAM, GROUP).await.unwrap();
        Fixture {
            channel,
            nodes,
            reclaimer,
        }
    }

    async fn publish_delete(channel: &MemoryChannel, url: &str) {
        let message = ChannelMessage::delete_shard(DeleteShardPayload::by_object_key("k", url));
        channel.publish(STREAM, &message).await.unwrap();
    }

    #[tokio::test]
    async fn deletes_and_acknowledges() {
        let f = fixture(0).await;
        publish_delete(&f.channel, "http://a/v2/shards/k").await;
        publish_delete(&f.channel, "http://b/v2/shards/k").await;

        assert_eq!(f.reclaimer.poll_once().await.unwrap(), 2);
        assert!(f.channel.pending(STREAM, GROUP).is_empty());
        assert_eq!(
            f.nodes.calls(),
            vec![
                NodeCall::Delete {
                    url: "http://a/v2/shards/k".into()
                },
                NodeCall::Delete {
                    url: "http://b/v2/shards/k".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn already_missing_objects_are_acknowledged() {
        let f = fixture(0).await;
        f.nodes.missing_on_delete("http://a/v2/shards/k");
        publish_delete(&f.channel, "http://a/v2/shards/k").await;

        assert_eq!(f.reclaimer.poll_once().await.unwrap(), 1);
        assert!(f.channel.pending(STREAM, GROUP).is_empty());
    }

    #[tokio::test]
    async fn failed_deletes_stay_pending() {
        let f = fixture(0).await;
        f.nodes.fail_delete("http://down/v2/shards/k");
        publish_delete(&f.channel, "http://down/v2/shards/k").await;
        publish_delete(&f.channel, "http://up/v2/shards/k").await;

        assert_eq!(f.reclaimer.poll_once().await.unwrap(), 1);
        assert_eq!(f.channel.pending(STREAM, GROUP), vec!["1-0".to_owned()]);
    }

    #[tokio::test]
    async fn failed_deletes_are_retried_until_they_succeed() {
        let f = fixture(0).await;
        let url = "http://down/v2/shards/k";
        f.nodes.fail_delete(url);
        publish_delete(&f.channel, url).await;

        for _ in 0..3 {
            assert_eq!(f.reclaimer.poll_once().await.unwrap(), 0);
        }
        let attempts = |nodes: &FakeNodeClient| {
            nodes.count(|c| matches!(c, NodeCall::Delete { url: u } if u == url))
        };
        assert_eq!(attempts(f.nodes.as_ref()), 3);
        assert_eq!(f.channel.pending(STREAM, GROUP), vec!["1-0".to_owned()]);

        f.nodes.recover_delete(url);
        assert_eq!(f.reclaimer.poll_once().await.unwrap(), 1);
        assert_eq!(attempts(f.nodes.as_ref()), 4);
        assert!(f.channel.pending(STREAM, GROUP).is_empty());
    }

    #[tokio::test]
    async fn other_messages_are_acknowledged_without_node_calls() {
        let f = fixture(0).await;
        let message = ChannelMessage::quota_changed(UserId::new("u"), 1);
        f.channel.publish(STREAM, &message).await.unwrap();

        assert_eq!(f.reclaimer.poll_once().await.unwrap(), 1);
        assert!(f.nodes.calls().is_empty());
    }

    #[tokio::test]
    async fn closed_channel_fails_the_poll() {
        let f = fixture(0).await;
        f.channel.close().await;
        assert!(matches!(
            f.reclaimer.poll_once().await,
            Err(ChannelError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let f = fixture(10).await;
        publish_delete(&f.channel, "http://a/v2/shards/k").await;

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        f.reclaimer.run(shutdown).await.unwrap();

        assert_eq!(f.nodes.count(|c| matches!(c, NodeCall::Delete { .. })), 1);
        assert!(f.channel.pending(STREAM, GROUP).is_empty());
    }
}
