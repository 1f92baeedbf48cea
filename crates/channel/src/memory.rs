use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::channel::{MessageChannel, StreamEntry};
use crate::error::ChannelError;
use crate::message::ChannelMessage;

#[derive(Debug, Default)]
struct GroupState {
    /// Number of stream entries already handed out to this group.
    delivered: usize,
    /// Delivered but not yet acknowledged, by id, with the consumer that
    /// holds each entry.
    pending: BTreeMap<String, String>,
}

/// In-memory implementation of [`MessageChannel`] for development and tests.
///
/// Publishes are confirmed immediately. [`MemoryChannel::unconnected`]
/// starts closed so that callers' not-connected handling can be exercised,
/// and [`MemoryChannel::fail_publishes`] makes the broker reject appends.
#[derive(Debug)]
pub struct MemoryChannel {
    connected: AtomicBool,
    reject: AtomicBool,
    sequence: AtomicU64,
    streams: DashMap<String, Vec<StreamEntry>>,
    groups: DashMap<(String, String), GroupState>,
}

impl MemoryChannel {
    /// A channel that is already connected.
    pub fn new() -> Self {
        let channel = Self::unconnected();
        channel.connected.store(true, Ordering::SeqCst);
        channel
    }

    /// A channel that fails with `NotConnected` until connected.
    pub fn unconnected() -> Self {
        Self {
            connected: AtomicBool::new(false),
            reject: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            streams: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    /// Make subsequent publishes fail with a broker error.
    pub fn fail_publishes(&self, fail: bool) {
        self.reject.store(fail, Ordering::SeqCst);
    }

    /// Every message confirmed on `stream`, in publish order.
    pub fn published(&self, stream: &str) -> Vec<ChannelMessage> {
        self.streams
            .get(stream)
            .map(|entries| entries.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Ids delivered to `group` but not yet acknowledged.
    pub fn pending(&self, stream: &str, group: &str) -> Vec<String> {
        self.groups
            .get(&(stream.to_owned(), group.to_owned()))
            .map(|state| state.pending.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }

    /// Hand the next `count` undelivered entries to `consumer` of `group`.
    fn take_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        self.ensure_connected()?;
        let mut state = self
            .groups
            .get_mut(&(stream.to_owned(), group.to_owned()))
            .ok_or_else(|| ChannelError::Backend(format!("no group {group} on {stream}")))?;

        let batch: Vec<StreamEntry> = self
            .streams
            .get(stream)
            .map(|entries| {
                entries
                    .iter()
                    .skip(state.delivered)
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        state.delivered += batch.len();
        state
            .pending
            .extend(batch.iter().map(|e| (e.id.clone(), consumer.to_owned())));
        Ok(batch)
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        stream: &str,
        message: &ChannelMessage,
    ) -> Result<String, ChannelError> {
        self.ensure_connected()?;
        if self.reject.load(Ordering::SeqCst) {
            return Err(ChannelError::Backend("append rejected".into()));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{seq}-0");
        self.streams
            .entry(stream.to_owned())
            .or_default()
            .push(StreamEntry {
                id: id.clone(),
                message: message.clone(),
            });
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), ChannelError> {
        self.ensure_connected()?;
        self.streams.entry(stream.to_owned()).or_default();
        self.groups
            .entry((stream.to_owned(), group.to_owned()))
            .or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        let batch = self.take_batch(stream, group, consumer, count)?;
        if batch.is_empty() && !block.is_zero() {
            tokio::time::sleep(block).await;
            return self.take_batch(stream, group, consumer, count);
        }
        Ok(batch)
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        self.ensure_connected()?;
        let state = self
            .groups
            .get(&(stream.to_owned(), group.to_owned()))
            .ok_or_else(|| ChannelError::Backend(format!("no group {group} on {stream}")))?;
        let held = |id: &str| state.pending.get(id).is_some_and(|c| c == consumer);

        Ok(self
            .streams
            .get(stream)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| held(&e.id))
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, ChannelError> {
        self.ensure_connected()?;
        let Some(mut state) = self.groups.get_mut(&(stream.to_owned(), group.to_owned())) else {
            return Ok(0);
        };
        let acked = ids
            .iter()
            .filter(|id| state.pending.remove(id.as_str()).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
