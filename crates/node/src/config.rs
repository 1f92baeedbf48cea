use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Basic-auth credentials presented to storage nodes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCredentials {
    pub username: String,
    pub password: String,
}

impl NodeCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Settings for [`HttpNodeClient`](crate::HttpNodeClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeClientConfig {
    pub credentials: NodeCredentials,
    /// Per-request timeout. Requests that exceed it fail with
    /// [`NodeError::Timeout`](crate::NodeError::Timeout).
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            credentials: NodeCredentials::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = NodeCredentials::new("bridge", "s3cret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bridge"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn config_timeout_is_milliseconds() {
        let config: NodeClientConfig = serde_json::from_str(
            r#"{"credentials":{"username":"u","password":"p"},"timeout_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.credentials.username, "u");
    }
}
