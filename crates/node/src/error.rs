use std::time::Duration;

use thiserror::Error;

/// Errors returned by storage-node requests.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node answered 404 for the requested object.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The node answered with an unexpected status code.
    #[error("node returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The node did not respond within the configured timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The node rejected the request due to rate limiting.
    #[error("rate limited")]
    RateLimited,

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The client was given invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl NodeError {
    /// Returns `true` if the error is transient and the request may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited => true,
            Self::Status { status, .. } => *status >= 500,
            Self::ObjectNotFound(_) | Self::InvalidResponse(_) | Self::Configuration(_) => false,
        }
    }
}
