use thiserror::Error;

/// Errors returned by a [`MessageChannel`](crate::MessageChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has not been connected yet, or was closed.
    #[error("channel is not connected")]
    NotConnected,

    /// Every connection attempt of the startup budget failed.
    #[error("could not connect after {attempts} attempts: {last_error}")]
    ConnectExhausted { attempts: u32, last_error: String },

    /// A connection to the broker could not be obtained.
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed a command.
    #[error("broker error: {0}")]
    Backend(String),

    /// A message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
