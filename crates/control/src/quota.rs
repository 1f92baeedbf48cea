use std::sync::Arc;

use tracing::{info, instrument, warn};

use shardvault_channel::{ChannelMessage, MessageChannel};
use shardvault_core::UserId;
use shardvault_repository::Repositories;

use crate::error::ControlError;

/// Administrative changes to a user's capacity limit.
pub struct QuotaAdmin {
    repos: Repositories,
    channel: Arc<dyn MessageChannel>,
    stream: String,
}

impl QuotaAdmin {
    pub fn new(
        repos: Repositories,
        channel: Arc<dyn MessageChannel>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            channel,
            stream: stream.into(),
        }
    }

    /// Set the user's limit and announce the change.
    ///
    /// The limit is persisted even if the announcement cannot be published.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn change_limit(&self, user_id: &UserId, new_limit: u64) -> Result<(), ControlError> {
        if self.repos.users.find_user(user_id).await?.is_none() {
            return Err(ControlError::UserNotFound(user_id.to_string()));
        }
        self.repos.users.set_max_space(user_id, new_limit).await?;

        let message = ChannelMessage::quota_changed(user_id.clone(), new_limit);
        if let Err(e) = self.channel.publish(&self.stream, &message).await {
            warn!(error = %e, "failed to announce quota change");
        }
        info!(new_limit, "quota changed");
        Ok(())
    }
}

impl std::fmt::Debug for QuotaAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaAdmin")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
