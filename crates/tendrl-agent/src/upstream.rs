//! Upstream HTTP client.
//!
//! One shared `reqwest::Client` with a hard request timeout is built at
//! startup and reused for all three calls: the batch POST issued by the
//! egress worker, and the single POST / poll GET issued inline by connection
//! handlers. Every request carries the agent-wide bearer credential.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::Config;
use crate::messages::Message;

/// Hard timeout applied to every upstream request.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Client for the tendrl ingest API. Safe to share across tasks.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    app_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            app_url: config.app_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    /// POSTs a batch to `/messages`.
    ///
    /// Only 201 Created counts as success. Anything else — transport error or
    /// unexpected status — is logged and the batch is dropped; fire-and-forget
    /// publishes are at-most-once.
    pub async fn post_batch(&self, batch: &[Message]) {
        debug!("flushing batch of {} messages", batch.len());
        let response = match self
            .request(Method::POST, format!("{}/messages", self.app_url))
            .json(batch)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("error sending batch: {e}");
                return;
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            error!("failed to send batch, status: {status}, body: {body}");
        }
    }

    /// POSTs one message to `/entities/message` and returns the upstream
    /// response body verbatim. Transport errors come back as
    /// `{"error": "<detail>"}` so the caller can relay them to the client.
    pub async fn post_single(&self, message: &Message) -> Value {
        let response = match self
            .request(Method::POST, format!("{}/entities/message", self.app_url))
            .json(message)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return json!({ "error": e.to_string() }),
        };

        response.json::<Value>().await.unwrap_or(Value::Null)
    }

    /// GETs up to `limit` pending messages from `/entities/check_messages`.
    ///
    /// 204 No Content means nothing pending; 200 carries
    /// `{"messages": [...]}`; any other status is an error.
    pub async fn poll(&self, limit: i64) -> Result<Vec<Message>, UpstreamError> {
        let url = format!("{}/entities/check_messages?limit={limit}", self.app_url);
        let response = self.request(Method::GET, url).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Vec::new()),
            StatusCode::OK => {
                #[derive(Deserialize)]
                struct CheckMessages {
                    #[serde(default)]
                    messages: Vec<Message>,
                }
                Ok(response.json::<CheckMessages>().await?.messages)
            }
            status => Err(UpstreamError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MsgType;
    use mockito::Server;

    fn test_client(url: &str) -> UpstreamClient {
        let config = Config {
            api_key: "test-key".to_string(),
            app_url: url.to_string(),
            ..Default::default()
        };
        UpstreamClient::new(&config).expect("client")
    }

    fn publish(data: &str) -> Message {
        Message {
            data: Some(data.to_string()),
            msg_type: Some(MsgType::Publish),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn post_batch_sends_json_array_with_bearer_credential() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(serde_json::json!([
                {"data": "a", "msg_type": "publish"},
                {"data": "b", "msg_type": "publish"},
            ])))
            .with_status(201)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client.post_batch(&[publish("a"), publish("b")]).await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_batch_tolerates_rejection_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .with_status(500)
            .with_body("upstream unhappy")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        // Non-201 is logged and dropped; no retry, no panic.
        client.post_batch(&[publish("a")]).await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_single_returns_upstream_body_verbatim() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/entities/message")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"ack":"ok","id":7}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let value = client.post_single(&publish("ping")).await;
        assert_eq!(value, serde_json::json!({"ack": "ok", "id": 7}));
    }

    #[tokio::test]
    async fn post_single_surfaces_transport_errors_as_error_object() {
        // Nothing listens on this port.
        let client = test_client("http://127.0.0.1:9");
        let value = client.post_single(&publish("ping")).await;
        assert!(value.get("error").is_some(), "got: {value}");
    }

    #[tokio::test]
    async fn poll_no_content_yields_empty_list() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/entities/check_messages?limit=1")
            .match_header("authorization", "Bearer test-key")
            .with_status(204)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let messages = client.poll(1).await.expect("poll");
        assert!(messages.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn poll_ok_returns_inner_messages() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/entities/check_messages?limit=3")
            .with_status(200)
            .with_body(r#"{"messages":[{"msg_type":"publish","data":"x"}]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let messages = client.poll(3).await.expect("poll");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data.as_deref(), Some("x"));
        assert_eq!(messages[0].msg_type, Some(MsgType::Publish));
    }

    #[tokio::test]
    async fn poll_unexpected_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/entities/check_messages?limit=1")
            .with_status(500)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.poll(1).await.expect_err("error");
        assert_eq!(err.to_string(), "unexpected status code: 500");
    }
}
