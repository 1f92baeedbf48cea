use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// A remote storage node ("farmer").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub reputation: i64,
    pub response_time_ms: Option<u64>,
    pub space_available: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_timeout: Option<DateTime<Utc>>,
    /// Fraction of recent requests that timed out, in `0.0..=1.0`.
    pub timeout_rate: f64,
    /// Trusted nodes are not probed for object existence on commit.
    #[serde(default)]
    pub trusted: bool,
}

impl Node {
    /// A healthy node reachable at `address:port`.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            protocol: "1.2.0".to_owned(),
            reputation: 0,
            response_time_ms: None,
            space_available: true,
            last_seen: Some(Utc::now()),
            last_timeout: None,
            timeout_rate: 0.0,
            trusted: false,
        }
    }

    /// Mark the node as trusted.
    #[must_use]
    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }

    /// `http://{address}:{port}`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// Whether the node was seen within `window` of `now`.
    #[must_use]
    pub fn seen_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_seen.is_some_and(|seen| now - seen <= window)
    }
}
