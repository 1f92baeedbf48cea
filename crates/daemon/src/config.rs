use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use shardvault_channel::{ChannelConfig, ConnectRetry, StreamNames};
use shardvault_control::UploadPolicy;
use shardvault_node::NodeClientConfig;

use crate::error::DaemonError;

/// Top-level daemon configuration, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub channel: ChannelSection,
    /// Storage-node client settings (credentials, request timeout).
    #[serde(default)]
    pub nodes: NodeClientConfig,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub reclaimer: ReclaimerSection,
    #[serde(default)]
    pub audit: AuditSection,
}

impl DaemonConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// The `[channel]` section.
#[derive(Debug, Deserialize)]
pub struct ChannelSection {
    /// `"memory"` or `"redis"`.
    #[serde(default = "default_channel_backend")]
    pub backend: String,
    #[serde(default = "default_channel_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_reclaim_stream")]
    pub reclaim_stream: String,
    #[serde(default = "default_notifications_stream")]
    pub notifications_stream: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
}

impl ChannelSection {
    pub fn streams(&self) -> StreamNames {
        StreamNames {
            reclaim: self.reclaim_stream.clone(),
            notifications: self.notifications_stream.clone(),
        }
    }

    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.url.clone(),
            pool_size: self.pool_size,
            retry: ConnectRetry {
                max_attempts: self.connect_attempts,
                delay: Duration::from_millis(self.connect_delay_ms),
            },
            streams: self.streams(),
            ..ChannelConfig::default()
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            backend: default_channel_backend(),
            url: default_channel_url(),
            pool_size: default_pool_size(),
            reclaim_stream: default_reclaim_stream(),
            notifications_stream: default_notifications_stream(),
            connect_attempts: default_connect_attempts(),
            connect_delay_ms: default_connect_delay_ms(),
        }
    }
}

fn default_channel_backend() -> String {
    "redis".to_owned()
}

fn default_channel_url() -> String {
    ChannelConfig::default().url
}

fn default_pool_size() -> usize {
    ChannelConfig::default().pool_size
}

fn default_reclaim_stream() -> String {
    StreamNames::default().reclaim
}

fn default_notifications_stream() -> String {
    StreamNames::default().notifications
}

fn default_connect_attempts() -> u32 {
    ConnectRetry::default().max_attempts
}

fn default_connect_delay_ms() -> u64 {
    3_000
}

/// The `[upload]` section.
#[derive(Debug, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_multipart_min_bytes")]
    pub multipart_min_bytes: u64,
}

impl UploadSection {
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy {
            multipart_min_bytes: self.multipart_min_bytes,
        }
    }
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            multipart_min_bytes: default_multipart_min_bytes(),
        }
    }
}

fn default_multipart_min_bytes() -> u64 {
    UploadPolicy::default().multipart_min_bytes
}

/// The `[reclaimer]` section: consumer-group settings of the reclamation
/// worker.
#[derive(Debug, Deserialize)]
pub struct ReclaimerSection {
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_consumer")]
    pub consumer: String,
    /// Entries read per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long one poll waits for new entries.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
}

impl Default for ReclaimerSection {
    fn default() -> Self {
        Self {
            group: default_group(),
            consumer: default_consumer(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
        }
    }
}

fn default_group() -> String {
    "reclaimers".to_owned()
}

fn default_consumer() -> String {
    "reclaimer-1".to_owned()
}

fn default_batch_size() -> usize {
    16
}

fn default_block_ms() -> u64 {
    5_000
}

/// The `[audit]` section.
#[derive(Debug, Deserialize)]
pub struct AuditSection {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Only `"memory"` is available.
    #[serde(default = "default_audit_backend")]
    pub backend: String,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            backend: default_audit_backend(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_backend() -> String {
    "memory".to_owned()
}
