use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shardvault_core::{Node, UploadPart};

use crate::client::{MultipartTarget, NodeClient};
use crate::config::{NodeClientConfig, NodeCredentials};
use crate::error::NodeError;
use crate::urls;

#[derive(Debug, Deserialize)]
struct LinkResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct MultipartLinkResponse {
    result: Vec<String>,
    #[serde(rename = "UploadId")]
    upload_id: String,
}

#[derive(Debug, Serialize)]
struct CompleteMultipartBody<'a> {
    #[serde(rename = "UploadId")]
    upload_id: &'a str,
    parts: &'a [UploadPart],
}

#[derive(Debug, Serialize)]
struct AbortMultipartBody<'a> {
    #[serde(rename = "UploadId")]
    upload_id: &'a str,
}

/// [`NodeClient`] speaking HTTP with basic auth via `reqwest`.
pub struct HttpNodeClient {
    client: Client,
    credentials: NodeCredentials,
    timeout: Duration,
}

impl HttpNodeClient {
    /// Build a client with the configured timeout.
    pub fn new(config: NodeClientConfig) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NodeError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            credentials: config.credentials,
            timeout: config.timeout,
        })
    }

    /// Use a preconfigured `reqwest::Client`.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, NodeError> {
        debug!(url, "node request");
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(NodeError::ObjectNotFound(url.to_owned())),
            StatusCode::TOO_MANY_REQUESTS => Err(NodeError::RateLimited),
            status => Err(NodeError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            }),
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> NodeError {
        if e.is_timeout() {
            NodeError::Timeout(self.timeout)
        } else {
            NodeError::Connection(e.to_string())
        }
    }

    async fn get_link(&self, url: &str) -> Result<String, NodeError> {
        let response = self.send(self.client.get(url), url).await?;
        let body: LinkResponse = response
            .json()
            .await
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))?;
        Ok(body.result)
    }
}

impl std::fmt::Debug for HttpNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNodeClient")
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn request_upload_url(
        &self,
        node: &Node,
        object_key: &str,
    ) -> Result<String, NodeError> {
        self.get_link(&urls::upload_link(node, object_key)).await
    }

    async fn request_multipart_urls(
        &self,
        node: &Node,
        object_key: &str,
        parts: u32,
    ) -> Result<MultipartTarget, NodeError> {
        let url = urls::multipart_link(node, object_key, parts);
        let response = self.send(self.client.get(&url), &url).await?;
        let body: MultipartLinkResponse = response
            .json()
            .await
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))?;
        if body.result.len() != parts as usize {
            return Err(NodeError::InvalidResponse(format!(
                "asked for {parts} part urls, got {}",
                body.result.len()
            )));
        }
        Ok(MultipartTarget {
            urls: body.result,
            session_id: body.upload_id,
        })
    }

    async fn finalize_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
        parts: &[UploadPart],
    ) -> Result<(), NodeError> {
        let url = urls::multipart_complete(node, object_key);
        let body = CompleteMultipartBody {
            upload_id: session_id,
            parts,
        };
        self.send(self.client.post(&url).json(&body), &url).await?;
        Ok(())
    }

    async fn abort_multipart(
        &self,
        node: &Node,
        object_key: &str,
        session_id: &str,
    ) -> Result<(), NodeError> {
        let url = urls::multipart_abort(node, object_key);
        let body = AbortMultipartBody {
            upload_id: session_id,
        };
        self.send(self.client.post(&url).json(&body), &url).await?;
        Ok(())
    }

    async fn object_exists(&self, node: &Node, object_key: &str) -> Result<bool, NodeError> {
        let url = urls::exists(node, object_key);
        match self.send(self.client.get(&url), &url).await {
            Ok(_) => Ok(true),
            Err(NodeError::ObjectNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn request_download_url(
        &self,
        node: &Node,
        object_key: &str,
    ) -> Result<String, NodeError> {
        self.get_link(&urls::download_link(node, object_key)).await
    }

    async fn delete_object(&self, url: &str) -> Result<(), NodeError> {
        self.send(self.client.delete(url), url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_with_config() {
        let config = NodeClientConfig {
            credentials: NodeCredentials::new("bridge", "pw"),
            timeout: Duration::from_secs(3),
        };
        let client = HttpNodeClient::new(config).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert!(!format!("{client:?}").contains("pw"));
    }

    #[test]
    fn multipart_body_uses_node_field_names() {
        let parts = vec![UploadPart {
            part_number: 1,
            etag: "e1".into(),
        }];
        let body = CompleteMultipartBody {
            upload_id: "s1",
            parts: &parts,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["UploadId"], "s1");
        assert_eq!(json["parts"][0]["PartNumber"], 1);
        assert_eq!(json["parts"][0]["ETag"], "e1");
    }

    #[test]
    fn multipart_link_response_parses() {
        let body: MultipartLinkResponse =
            serde_json::from_str(r#"{"result":["u1","u2"],"UploadId":"abc"}"#).unwrap();
        assert_eq!(body.result.len(), 2);
        assert_eq!(body.upload_id, "abc");
    }

    #[tokio::test]
    async fn unreachable_node_is_a_connection_error() {
        let client = HttpNodeClient::new(NodeClientConfig {
            credentials: NodeCredentials::default(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let node = Node::new("n", "127.0.0.1", 1);
        let err = client.object_exists(&node, "k").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
