use std::sync::Arc;

use shardvault_audit::AuditStore;
use shardvault_channel::{MessageChannel, StreamNames};
use shardvault_node::NodeClient;
use shardvault_reclaim::ReclamationDispatcher;
use shardvault_repository::Repositories;

use crate::config::{NodeSelectionPolicy, UploadPolicy};
use crate::deletion::DeletionEngine;
use crate::download::DownloadResolver;
use crate::error::ControlError;
use crate::quota::QuotaAdmin;
use crate::selector::NodeSelector;
use crate::upload::UploadOrchestrator;

/// The assembled control plane.
pub struct ControlPlane {
    pub uploads: UploadOrchestrator,
    pub deletions: DeletionEngine,
    pub downloads: DownloadResolver,
    pub quota: QuotaAdmin,
    pub selector: NodeSelector,
    dispatcher: Arc<ReclamationDispatcher>,
}

impl ControlPlane {
    /// Wait for every in-flight reclamation notification.
    pub async fn shutdown(&self) {
        self.dispatcher.drain().await;
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for a [`ControlPlane`].
///
/// Repositories, a node client and a message channel are required. The audit
/// sink is optional; without one, bulk delete failures are only logged.
#[derive(Default)]
pub struct ControlPlaneBuilder {
    repos: Option<Repositories>,
    nodes: Option<Arc<dyn NodeClient>>,
    channel: Option<Arc<dyn MessageChannel>>,
    audit: Option<Arc<dyn AuditStore>>,
    upload_policy: UploadPolicy,
    selection_policy: NodeSelectionPolicy,
    streams: StreamNames,
}

impl ControlPlaneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn repositories(mut self, repos: Repositories) -> Self {
        self.repos = Some(repos);
        self
    }

    #[must_use]
    pub fn node_client(mut self, nodes: Arc<dyn NodeClient>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    #[must_use]
    pub fn selection_policy(mut self, policy: NodeSelectionPolicy) -> Self {
        self.selection_policy = policy;
        self
    }

    /// Override the stream names used for reclamation and notifications.
    #[must_use]
    pub fn streams(mut self, streams: StreamNames) -> Self {
        self.streams = streams;
        self
    }

    /// Returns [`ControlError::Configuration`] if a required collaborator is
    /// missing.
    pub fn build(self) -> Result<ControlPlane, ControlError> {
        let repos = self
            .repos
            .ok_or_else(|| ControlError::Configuration("repositories are required".into()))?;
        let nodes = self
            .nodes
            .ok_or_else(|| ControlError::Configuration("node client is required".into()))?;
        let channel = self
            .channel
            .ok_or_else(|| ControlError::Configuration("message channel is required".into()))?;

        let dispatcher = Arc::new(ReclamationDispatcher::new(
            repos.clone(),
            Arc::clone(&channel),
            self.streams.reclaim,
        ));

        Ok(ControlPlane {
            uploads: UploadOrchestrator::new(repos.clone(), Arc::clone(&nodes), self.upload_policy),
            deletions: DeletionEngine::new(repos.clone(), Arc::clone(&dispatcher), self.audit),
            downloads: DownloadResolver::new(repos.clone(), nodes),
            quota: QuotaAdmin::new(repos.clone(), channel, self.streams.notifications),
            selector: NodeSelector::new(repos, self.selection_policy),
            dispatcher,
        })
    }
}
