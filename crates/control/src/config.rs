use std::time::Duration;

/// Limits applied at upload admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Smallest total upload size for which more than one part may be
    /// requested.
    pub multipart_min_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            multipart_min_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Health thresholds a node must meet to receive new shards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSelectionPolicy {
    /// Nodes timing out on a larger fraction of requests are excluded.
    pub max_timeout_rate: f64,
    /// Nodes not seen for longer than this are excluded.
    pub freshness: Duration,
}

impl Default for NodeSelectionPolicy {
    fn default() -> Self {
        Self {
            max_timeout_rate: 0.04,
            freshness: Duration::from_secs(24 * 60 * 60),
        }
    }
}
