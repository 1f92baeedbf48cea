use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use shardvault_core::{Node, NodeId};
use shardvault_repository::Repositories;

use crate::config::NodeSelectionPolicy;
use crate::error::ControlError;

/// Builds the pool of nodes eligible to receive new shards.
#[derive(Debug, Clone)]
pub struct NodeSelector {
    repos: Repositories,
    policy: NodeSelectionPolicy,
}

impl NodeSelector {
    pub fn new(repos: Repositories, policy: NodeSelectionPolicy) -> Self {
        Self { repos, policy }
    }

    /// Ids of every registered node that currently passes the health policy.
    pub async fn pool(&self) -> Result<Vec<NodeId>, ControlError> {
        let now = Utc::now();
        let nodes = self.repos.nodes.list_nodes().await?;
        Ok(nodes
            .into_iter()
            .filter(|n| self.eligible(n, now))
            .map(|n| n.id)
            .collect())
    }

    /// Whether `node` has space, is not flaky, and was seen recently.
    pub fn eligible(&self, node: &Node, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(self.policy.freshness)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        node.space_available
            && node.timeout_rate <= self.policy.max_timeout_rate
            && node.seen_within(now, window)
    }
}

/// Pick one node uniformly at random.
pub fn pick_node(pool: &[NodeId]) -> Result<NodeId, ControlError> {
    pool.choose(&mut rand::thread_rng())
        .cloned()
        .ok_or(ControlError::NoNodeAvailable)
}
