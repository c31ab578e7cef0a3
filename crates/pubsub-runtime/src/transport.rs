//! Transport boundary: the dumb network layer under the queue client.
//!
//! The [`Transport`] trait carries raw requests and responses only. All
//! retry, deadline, and validation logic stays in
//! [`PubsubClient`](crate::client::PubsubClient); a transport's single
//! judgement call is classifying its own failures as transient or not, via
//! [`TransportError::is_transient`](crate::error::TransportError::is_transient).

use crate::auth::TokenProvider;
use crate::error::{ConfigurationError, TransportError};
use crate::message::AckId;
use crate::path::{ProjectId, SubscriptionPath, TopicPath};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Network operations the queue client depends on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Pull up to `max_messages` from a subscription. With
    /// `return_immediately` set, the service answers an empty response
    /// instead of holding the connection open waiting for a message.
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Value, TransportError>;

    /// Publish a prepared message body to a topic
    async fn publish(&self, topic: &TopicPath, body: Value) -> Result<Value, TransportError>;

    /// Acknowledge deliveries on a subscription. No response body is
    /// expected; absence of an error is success.
    async fn acknowledge(
        &self,
        subscription: &SubscriptionPath,
        ack_ids: &[AckId],
    ) -> Result<(), TransportError>;

    /// List the topics in a project (raw response)
    async fn list_topics(&self, project: &ProjectId) -> Result<Value, TransportError>;

    /// List the subscriptions in a project (raw response)
    async fn list_subscriptions(&self, project: &ProjectId) -> Result<Value, TransportError>;

    /// Create a topic
    async fn create_topic(&self, topic: &TopicPath) -> Result<(), TransportError>;

    /// Create a subscription attached to a topic
    async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
        ack_deadline_seconds: u32,
    ) -> Result<(), TransportError>;
}

/// HTTP transport speaking the JSON REST dialect of the queue service
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    /// Build a transport against the given endpoint. The timeout bounds each
    /// individual network attempt; there is no mid-flight cancellation
    /// beyond it.
    pub fn new(
        endpoint: &str,
        api_version: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            tokens,
        })
    }

    /// Build a URL for a verb on a resource, e.g. `.../v1/projects/p/subscriptions/s:pull`
    fn action_url(&self, resource: &str, verb: &str) -> String {
        format!("{}/{}/{}:{}", self.base_url, self.api_version, resource, verb)
    }

    /// Build a URL addressing a resource directly
    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.api_version, resource)
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let token = self.tokens.bearer_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        read_json(response).await
    }

    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        let token = self.tokens.bearer_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify)?;

        read_json(response).await
    }

    async fn put(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let token = self.tokens.bearer_token().await?;

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        read_json(response).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Value, TransportError> {
        let url = self.action_url(subscription.as_str(), "pull");
        let body = json!({
            "maxMessages": max_messages,
            "returnImmediately": return_immediately,
        });
        self.post(&url, &body).await
    }

    async fn publish(&self, topic: &TopicPath, body: Value) -> Result<Value, TransportError> {
        let url = self.action_url(topic.as_str(), "publish");
        self.post(&url, &body).await
    }

    async fn acknowledge(
        &self,
        subscription: &SubscriptionPath,
        ack_ids: &[AckId],
    ) -> Result<(), TransportError> {
        let url = self.action_url(subscription.as_str(), "acknowledge");
        let ids: Vec<&str> = ack_ids.iter().map(AckId::as_str).collect();
        let body = json!({ "ackIds": ids });
        self.post(&url, &body).await.map(|_| ())
    }

    async fn list_topics(&self, project: &ProjectId) -> Result<Value, TransportError> {
        let url = self.resource_url(&format!("{}/topics", project.as_path()));
        self.get(&url).await
    }

    async fn list_subscriptions(&self, project: &ProjectId) -> Result<Value, TransportError> {
        let url = self.resource_url(&format!("{}/subscriptions", project.as_path()));
        self.get(&url).await
    }

    async fn create_topic(&self, topic: &TopicPath) -> Result<(), TransportError> {
        let url = self.resource_url(topic.as_str());
        self.put(&url, &json!({})).await.map(|_| ())
    }

    async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
        ack_deadline_seconds: u32,
    ) -> Result<(), TransportError> {
        let url = self.resource_url(subscription.as_str());
        let body = json!({
            "topic": topic.as_str(),
            "ackDeadlineSeconds": ack_deadline_seconds,
        });
        self.put(&url, &body).await.map(|_| ())
    }
}

/// Map a client-side HTTP failure onto the transport taxonomy.
///
/// Connection errors include TLS handshake failures surfaced by the
/// connector; both are the transient class the pull retry loop acts on.
fn classify(error: reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::ConnectionFailed {
            message: error.to_string(),
        }
    } else if error.is_timeout() {
        TransportError::Timeout {
            message: error.to_string(),
        }
    } else if error.is_decode() {
        TransportError::InvalidBody {
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            message: error.to_string(),
        }
    }
}

/// Check the status line, then decode the body as JSON. An empty body (ack
/// and create respond with nothing useful) decodes as an empty object.
async fn read_json(response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let text = response.text().await.map_err(classify)?;
    if text.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_str(&text).map_err(|e| TransportError::InvalidBody {
        message: e.to_string(),
    })
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
