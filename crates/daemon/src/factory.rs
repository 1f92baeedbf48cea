use std::sync::Arc;

use tracing::info;

use shardvault_audit::AuditStore;
use shardvault_audit_memory::MemoryAuditStore;
use shardvault_channel::{MemoryChannel, MessageChannel, RedisStreamChannel};
use shardvault_control::{ControlPlane, ControlPlaneBuilder};
use shardvault_node::{HttpNodeClient, NodeClient};
use shardvault_repository::Repositories;

use crate::config::{AuditSection, ChannelSection, DaemonConfig};
use crate::error::DaemonError;

/// Create and connect the message channel named by `[channel] backend`.
///
/// A Redis channel retries its connection within the configured budget and
/// fails with the last error once the budget is spent.
pub async fn create_channel(config: &ChannelSection) -> Result<Arc<dyn MessageChannel>, DaemonError> {
    let channel: Arc<dyn MessageChannel> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryChannel::unconnected()),
        "redis" => Arc::new(RedisStreamChannel::new(config.to_channel_config())),
        other => {
            return Err(DaemonError::Config(format!(
                "unknown channel backend: {other}"
            )));
        }
    };
    channel.connect().await?;
    info!(backend = %config.backend, "message channel connected");
    Ok(channel)
}

/// Create the audit sink, or `None` when auditing is disabled.
pub fn create_audit_store(
    config: &AuditSection,
) -> Result<Option<Arc<dyn AuditStore>>, DaemonError> {
    if !config.enabled {
        return Ok(None);
    }
    match config.backend.as_str() {
        "memory" => Ok(Some(Arc::new(MemoryAuditStore::new()))),
        other => Err(DaemonError::Config(format!(
            "unknown audit backend: {other}"
        ))),
    }
}

pub fn create_node_client(config: &DaemonConfig) -> Result<Arc<dyn NodeClient>, DaemonError> {
    Ok(Arc::new(HttpNodeClient::new(config.nodes.clone())?))
}

/// Assemble a control plane over `repos` for hosts that embed it.
pub fn create_control_plane(
    config: &DaemonConfig,
    repos: Repositories,
    channel: Arc<dyn MessageChannel>,
) -> Result<ControlPlane, DaemonError> {
    let mut builder = ControlPlaneBuilder::new()
        .repositories(repos)
        .node_client(create_node_client(config)?)
        .channel(channel)
        .upload_policy(config.upload.policy())
        .streams(config.channel.streams());
    if let Some(audit) = create_audit_store(&config.audit)? {
        builder = builder.audit(audit);
    }
    Ok(builder.build()?)
}
