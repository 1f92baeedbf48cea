use thiserror::Error;

use shardvault_channel::ChannelError;
use shardvault_control::ControlError;
use shardvault_node::NodeError;

/// Errors that can stop the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("node client error: {0}")]
    Node(#[from] NodeError),

    #[error("control plane error: {0}")]
    Control(#[from] ControlError),
}
