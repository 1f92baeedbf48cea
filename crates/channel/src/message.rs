use serde::{Deserialize, Serialize};

use shardvault_core::UserId;

/// Messages carried by the channel.
///
/// Encoded as `{"type": "DELETE_SHARD", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelMessage {
    /// Ask one node to free one shard.
    DeleteShard(DeleteShardPayload),
    /// A user's capacity limit was changed administratively.
    QuotaChanged(QuotaChangedPayload),
}

/// Target of a shard deletion. Exactly one of `key` (current generation) or
/// `hash` (legacy generation) is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteShardPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Fully built node endpoint the deletion is sent to.
    pub url: String,
}

impl DeleteShardPayload {
    pub fn by_object_key(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            hash: None,
            url: url.into(),
        }
    }

    pub fn by_content_hash(hash: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: None,
            hash: Some(hash.into()),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaChangedPayload {
    pub user_id: UserId,
    pub new_limit: u64,
}

impl ChannelMessage {
    pub fn delete_shard(payload: DeleteShardPayload) -> Self {
        Self::DeleteShard(payload)
    }

    pub fn quota_changed(user_id: UserId, new_limit: u64) -> Self {
        Self::QuotaChanged(QuotaChangedPayload { user_id, new_limit })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn delete_shard_wire_shape() {
        let msg = ChannelMessage::delete_shard(DeleteShardPayload::by_object_key(
            "k1",
            "http://n:1/v2/shards/k1",
        ));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "DELETE_SHARD",
                "payload": { "key": "k1", "url": "http://n:1/v2/shards/k1" }
            })
        );
    }

    #[test]
    fn legacy_delete_carries_hash_only() {
        let msg = ChannelMessage::delete_shard(DeleteShardPayload::by_content_hash(
            "abc",
            "http://n:1/shards/abc",
        ));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"]["hash"], "abc");
        assert!(value["payload"].get("key").is_none());
    }

    #[test]
    fn quota_changed_wire_shape() {
        let msg = ChannelMessage::quota_changed(UserId::new("u1"), 2048);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "QUOTA_CHANGED",
                "payload": { "userId": "u1", "newLimit": 2048 }
            })
        );
    }

    #[test]
    fn decodes_published_shape() {
        let raw = r#"{"type":"DELETE_SHARD","payload":{"hash":"h","url":"u"}}"#;
        let msg: ChannelMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ChannelMessage::DeleteShard(DeleteShardPayload::by_content_hash("h", "u"))
        );
    }
}
