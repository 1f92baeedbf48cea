use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::channel::{MessageChannel, StreamEntry};
use crate::config::ChannelConfig;
use crate::connect::connect_with_retry;
use crate::error::ChannelError;
use crate::message::ChannelMessage;

/// Field under which the JSON-encoded message is stored in each entry.
const DATA_FIELD: &str = "data";

/// Redis Streams implementation of [`MessageChannel`].
///
/// `XADD` replies with the entry id only after Redis has appended the entry,
/// which is the broker confirmation a publish waits for. Consumers use
/// consumer groups so unacknowledged entries are redelivered.
pub struct RedisStreamChannel {
    config: ChannelConfig,
    pool: RwLock<Option<Pool>>,
}

impl RedisStreamChannel {
    /// Create an unconnected channel. Call
    /// [`connect`](MessageChannel::connect) before publishing.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn build_pool(&self) -> Result<Pool, ChannelError> {
        Config::from_url(&self.config.url)
            .builder()
            .map(|b| {
                b.max_size(self.config.pool_size)
                    .wait_timeout(Some(self.config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| ChannelError::Connection(e.to_string()))?
            .map_err(|e| ChannelError::Connection(e.to_string()))
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, ChannelError> {
        let pool = self
            .pool
            .read()
            .await
            .clone()
            .ok_or(ChannelError::NotConnected)?;
        pool.get()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))
    }

    /// `XREADGROUP` from `start`, decoding entries. Entries that cannot be
    /// decoded, including pending ids whose entry was trimmed, are
    /// acknowledged and dropped.
    async fn read_entries(
        &self,
        stream: &str,
        group: &str,
        start: &str,
        options: &StreamReadOptions,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        let mut conn = self.conn().await?;
        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[start], options)
            .await
            .map_err(|e| backend(&e))?;

        let mut entries = Vec::new();
        let mut malformed = Vec::new();
        for key in reply.keys {
            for raw in key.ids {
                let decoded = raw
                    .get::<String>(DATA_FIELD)
                    .ok_or_else(|| ChannelError::Serialization("missing data field".into()))
                    .and_then(|data| {
                        serde_json::from_str::<ChannelMessage>(&data).map_err(ChannelError::from)
                    });
                match decoded {
                    Ok(message) => entries.push(StreamEntry {
                        id: raw.id,
                        message,
                    }),
                    Err(e) => {
                        warn!(stream, id = %raw.id, error = %e, "dropping malformed entry");
                        malformed.push(raw.id);
                    }
                }
            }
        }

        if !malformed.is_empty() {
            let _: u64 = conn
                .xack(stream, group, &malformed)
                .await
                .map_err(|e| backend(&e))?;
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for RedisStreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamChannel")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

async fn ping(pool: &Pool) -> Result<(), ChannelError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| ChannelError::Connection(e.to_string()))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| ChannelError::Connection(e.to_string()))?;
    Ok(())
}

fn backend(e: &redis::RedisError) -> ChannelError {
    ChannelError::Backend(e.to_string())
}

#[async_trait]
impl MessageChannel for RedisStreamChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        let pool = connect_with_retry(&self.config.retry, || async move {
            let pool = self.build_pool()?;
            ping(&pool).await?;
            Ok(pool)
        })
        .await?;
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn publish(
        &self,
        stream: &str,
        message: &ChannelMessage,
    ) -> Result<String, ChannelError> {
        let data = serde_json::to_string(message)?;
        let mut conn = self.conn().await?;
        let id: String = conn
            .xadd(stream, "*", &[(DATA_FIELD, data)])
            .await
            .map_err(|e| backend(&e))?;
        debug!(stream, id = %id, "message published");
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), ChannelError> {
        let mut conn = self.conn().await?;
        let created: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(backend(&e)),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        let block_ms = usize::try_from(block.as_millis()).unwrap_or(usize::MAX);
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);
        self.read_entries(stream, group, ">", &options).await
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, ChannelError> {
        // An explicit id replays this consumer's pending entries list.
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        self.read_entries(stream, group, "0", &options).await
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, ChannelError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        conn.xack(stream, group, ids).await.map_err(|e| backend(&e))
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close();
        }
    }
}
