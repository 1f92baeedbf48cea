use std::time::Duration;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::message::ChannelMessage;

/// A message read from a stream by a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Broker-assigned id, used to acknowledge the entry.
    pub id: String,
    pub message: ChannelMessage,
}

/// Broker-acknowledged, at-least-once message channel.
///
/// The channel is an explicitly connected and explicitly closed resource.
/// Implementations must fail with [`ChannelError::NotConnected`] when used
/// before [`connect`](MessageChannel::connect) or after
/// [`close`](MessageChannel::close).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Establish the broker connection using the configured retry budget.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Append `message` to `stream`. Resolves with the broker-assigned id
    /// once the broker has confirmed receipt.
    async fn publish(&self, stream: &str, message: &ChannelMessage)
    -> Result<String, ChannelError>;

    /// Create `group` on `stream` (and the stream itself) if missing.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), ChannelError>;

    /// Read up to `count` entries not yet delivered to `group`, waiting at
    /// most `block` for new entries.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, ChannelError>;

    /// Read up to `count` entries already delivered to `consumer` but not
    /// yet acknowledged, oldest first. Never blocks.
    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, ChannelError>;

    /// Acknowledge processed entries. Returns how many were pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, ChannelError>;

    /// Release the broker connection. Later calls fail with `NotConnected`.
    async fn close(&self);
}
