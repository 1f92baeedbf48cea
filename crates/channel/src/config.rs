use std::time::Duration;

/// Bounded retry used when establishing the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between two attempts.
    pub delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(3),
        }
    }
}

/// Names of the streams the control plane publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNames {
    /// Shard deletion notifications, consumed by the reclamation worker.
    pub reclaim: String,
    /// Outward events for external collaborators (quota changes).
    pub notifications: String,
}

impl Default for StreamNames {
    fn default() -> Self {
        Self {
            reclaim: String::from("shardvault:reclaim"),
            notifications: String::from("shardvault:notifications"),
        }
    }
}

/// Configuration for [`RedisStreamChannel`](crate::RedisStreamChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,

    pub retry: ConnectRetry,

    pub streams: StreamNames,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            pool_size: 8,
            connection_timeout: Duration::from_secs(5),
            retry: ConnectRetry::default(),
            streams: StreamNames::default(),
        }
    }
}
