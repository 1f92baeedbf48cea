//! At-least-once message channel used to notify storage nodes and external
//! collaborators.
//!
//! A publish resolves only once the broker has confirmed receipt. Publishing
//! on a channel that has not been connected (or has been closed) fails with
//! [`ChannelError::NotConnected`] instead of buffering.

pub mod channel;
pub mod config;
pub mod connect;
pub mod error;
pub mod memory;
pub mod message;
pub mod streams;

pub use channel::{MessageChannel, StreamEntry};
pub use config::{ChannelConfig, ConnectRetry, StreamNames};
pub use connect::connect_with_retry;
pub use error::ChannelError;
pub use memory::MemoryChannel;
pub use message::{ChannelMessage, DeleteShardPayload, QuotaChangedPayload};
pub use streams::RedisStreamChannel;
