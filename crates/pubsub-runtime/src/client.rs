//! Queue client: pull, validate, publish, acknowledge, and requeue.
//!
//! All retry, deadline, and validation logic lives here; the
//! [`Transport`] underneath is a dumb network layer. Every operation is a
//! sequential round trip. The only place multiple attempts happen inside
//! one logical call is the transient-failure retry loop shared by pull and
//! publish.

use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::PubsubError;
use crate::message::{encode_publish_body, AckId, Attributes, Envelope, Payload, Timestamp};
use crate::path::{ProjectId, SubscriptionPath, TopicPath};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Transport};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Safety buffer reserved before the server-side deadline would consider a
/// pulled message abandoned. Deadlines shorter than the buffer are used
/// as-is.
const EXPIRY_BUFFER_SECONDS: u32 = 30;

/// Client for a pull-based, at-least-once message queue.
///
/// The queue is at-least-once: duplicates are possible and downstream
/// consumers must tolerate redelivery. Configuration is immutable after
/// construction.
pub struct PubsubClient {
    transport: Arc<dyn Transport>,
    project: ProjectId,
    config: ClientConfig,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubClient")
            .field("project", &self.project)
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PubsubClient {
    /// Create a client speaking HTTP to the configured endpoint.
    ///
    /// Fails fast on an invalid configuration; a credential source is
    /// required by construction of the token provider itself.
    pub fn new(
        config: ClientConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, PubsubError> {
        let transport = HttpTransport::new(
            &config.endpoint,
            &config.api_version,
            config.socket_timeout,
            tokens,
        )?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over an existing transport. This is the seam test
    /// doubles plug into.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PubsubError> {
        config.validate()?;
        let project = ProjectId::new(&config.project)?;
        let retry = RetryPolicy::with_max_attempts(config.max_retries);

        Ok(Self {
            transport,
            project,
            config,
            retry,
        })
    }

    /// Replace the retry delay schedule. The attempt ceiling still comes
    /// from the policy, so this also overrides `max_retries`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The project this client operates in
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ========================================================================
    // Pull
    // ========================================================================

    /// Pull the next message from a subscription.
    ///
    /// Requests exactly one message and asks the transport not to wait for
    /// one to arrive. Transient transport failures are retried up to the
    /// configured ceiling, then surface as
    /// [`PubsubError::RetriesExhausted`]; any other transport error
    /// propagates immediately. A response with no messages is
    /// [`PubsubError::EmptyQueue`].
    ///
    /// Pulling does not acknowledge; the returned [`Envelope`] carries the
    /// locally computed expiry after which the server may redeliver.
    pub async fn pull(&self, subscription: &SubscriptionPath) -> Result<Envelope, PubsubError> {
        let mut attempts = 0;

        let response = loop {
            attempts += 1;
            debug!(
                subscription = %subscription,
                attempt = attempts,
                "pulling one message"
            );

            match self.transport.pull(subscription, 1, true).await {
                Ok(response) => break response,
                Err(e) if e.is_transient() => {
                    warn!(
                        subscription = %subscription,
                        attempt = attempts,
                        error = %e,
                        "transient failure pulling message"
                    );
                    if !self.retry.allows_another(attempts) {
                        return Err(PubsubError::RetriesExhausted {
                            attempts,
                            source: e,
                        });
                    }
                    tokio::time::sleep(self.retry.delay_for(attempts)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if is_empty_response(&response) {
            debug!(subscription = %subscription, "no messages in subscription");
            return Err(PubsubError::EmptyQueue {
                subscription: subscription.to_string(),
            });
        }

        let envelope = Envelope::parse(&response, self.expiry_from_now())?;

        info!(
            subscription = %subscription,
            message_id = envelope.message_id().unwrap_or("<unknown>"),
            publish_time = envelope.publish_time().unwrap_or("<unknown>"),
            expire_at = %envelope.expire_at(),
            "message pulled from the queue"
        );

        Ok(envelope)
    }

    /// Expiry for a message pulled right now: the acknowledgement deadline
    /// minus a safety buffer, unless the deadline is too small to afford
    /// one.
    fn expiry_from_now(&self) -> Timestamp {
        let deadline = self.config.effective_ack_deadline_seconds();
        let seconds = if deadline >= EXPIRY_BUFFER_SECONDS {
            deadline - EXPIRY_BUFFER_SECONDS
        } else {
            deadline
        };
        Timestamp::seconds_from_now(i64::from(seconds))
    }

    // ========================================================================
    // Acknowledge
    // ========================================================================

    /// Acknowledge one or more deliveries on a subscription.
    ///
    /// Never retried internally: a lost acknowledgement is safe under
    /// at-least-once semantics because the queue simply redelivers after
    /// the deadline. Acknowledging an already-acknowledged id is a no-op
    /// from the client's perspective; no local state tracks prior acks.
    pub async fn ack(
        &self,
        subscription: &SubscriptionPath,
        ack_ids: &[AckId],
    ) -> Result<(), PubsubError> {
        if ack_ids.is_empty() {
            debug!(subscription = %subscription, "nothing to acknowledge");
            return Ok(());
        }

        self.transport.acknowledge(subscription, ack_ids).await?;

        info!(
            subscription = %subscription,
            count = ack_ids.len(),
            "message acknowledged"
        );
        debug!(ack_ids = ?ack_ids, "acknowledged ids");

        Ok(())
    }

    /// Acknowledge a single delivery
    pub async fn ack_one(
        &self,
        subscription: &SubscriptionPath,
        ack_id: &AckId,
    ) -> Result<(), PubsubError> {
        self.ack(subscription, std::slice::from_ref(ack_id)).await
    }

    // ========================================================================
    // Publish
    // ========================================================================

    /// Publish attributes and/or a payload to a topic.
    ///
    /// At least one of the two must be non-empty. The payload is JSON
    /// serialized with deterministically ordered keys, UTF-8 encoded, and
    /// base64 encoded for the wire. Transient transport failures are
    /// retried under the same policy as pull; the retry is deliberately
    /// not blind, so fatal errors surface on the first attempt.
    pub async fn publish(
        &self,
        topic: &TopicPath,
        attributes: Attributes,
        payload: Payload,
    ) -> Result<Value, PubsubError> {
        if attributes.is_empty() && payload.is_empty() {
            return Err(PubsubError::NothingToSend);
        }

        let body = encode_publish_body(&attributes, &payload);
        let mut attempts = 0;

        let response = loop {
            attempts += 1;
            debug!(topic = %topic, attempt = attempts, "publishing message");

            match self.transport.publish(topic, body.clone()).await {
                Ok(response) => break response,
                Err(e) if e.is_transient() => {
                    warn!(
                        topic = %topic,
                        attempt = attempts,
                        error = %e,
                        "transient failure publishing message"
                    );
                    if !self.retry.allows_another(attempts) {
                        return Err(PubsubError::PublishFailed {
                            attempts,
                            source: e,
                        });
                    }
                    tokio::time::sleep(self.retry.delay_for(attempts)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!(topic = %topic, "message sent");
        debug!(response = %response, "publish response");

        Ok(response)
    }

    // ========================================================================
    // Requeue
    // ========================================================================

    /// Move one message from a subscription back onto a topic: publish a
    /// copy, then acknowledge the original.
    ///
    /// Returns `Ok(false)` when the subscription is empty. A message whose
    /// attributes or payload cannot be extracted is drained: it is
    /// acknowledged so it cannot loop back forever, and the extraction
    /// error is surfaced to the caller. A publish failure leaves the
    /// original un-acked, favoring redelivery over silent loss. Between a
    /// successful publish and the final ack there is a window where a crash
    /// leaves the message on both queues; callers must tolerate duplicate
    /// delivery.
    pub async fn requeue(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
    ) -> Result<bool, PubsubError> {
        let envelope = match self.pull(subscription).await {
            Ok(envelope) => envelope,
            Err(e) if e.is_empty_queue() => return Ok(false),
            Err(e) => return Err(e),
        };

        // Capture the ack id first so cleanup is possible whatever fails
        // later.
        let ack_id = envelope.ack_id().clone();

        let extracted = envelope
            .attributes(&[])
            .and_then(|attributes| envelope.data(&[]).map(|payload| (attributes, payload)));

        let (attributes, payload) = match extracted {
            Ok(extracted) => extracted,
            Err(e) => {
                error!(
                    subscription = %subscription,
                    message_id = envelope.message_id().unwrap_or("<unknown>"),
                    error = %e,
                    "message is corrupted, draining it"
                );

                // Acknowledge the corrupt message so no one else gets it,
                // then surface the original error. If even the ack fails,
                // the extraction error still matters more to the caller.
                if let Err(ack_error) = self.ack_one(subscription, &ack_id).await {
                    warn!(
                        subscription = %subscription,
                        error = %ack_error,
                        "failed to acknowledge corrupt message"
                    );
                }

                return Err(e.into());
            }
        };

        debug!(attributes = ?attributes, "requeueing attributes");
        debug!(payload = ?payload, "requeueing payload");

        self.publish(topic, attributes, payload).await?;
        self.ack_one(subscription, &ack_id).await?;

        info!(
            subscription = %subscription,
            topic = %topic,
            "message requeued"
        );

        Ok(true)
    }

    // ========================================================================
    // Delegated Administration
    // ========================================================================

    /// Check that every named topic exists in the project
    pub async fn verify_topics(&self, topics: &[TopicPath]) -> Result<bool, PubsubError> {
        let response = self.transport.list_topics(&self.project).await?;
        let existing = resource_names(&response, "topics");

        if existing.is_empty() {
            debug!(project = %self.project, "no topics found in the project");
        }

        Ok(all_present(topics.iter().map(TopicPath::as_str), &existing, "topic"))
    }

    /// Check that every named subscription exists in the project
    pub async fn verify_subscriptions(
        &self,
        subscriptions: &[SubscriptionPath],
    ) -> Result<bool, PubsubError> {
        let response = self.transport.list_subscriptions(&self.project).await?;
        let existing = resource_names(&response, "subscriptions");

        if existing.is_empty() {
            debug!(project = %self.project, "no subscriptions found in the project");
        }

        Ok(all_present(
            subscriptions.iter().map(SubscriptionPath::as_str),
            &existing,
            "subscription",
        ))
    }

    /// Create a topic. Idempotent: an existing topic is success.
    pub async fn create_topic(&self, topic: &TopicPath) -> Result<(), PubsubError> {
        if self.verify_topics(std::slice::from_ref(topic)).await? {
            debug!(topic = %topic, "topic already exists");
            return Ok(());
        }

        self.transport.create_topic(topic).await?;
        info!(topic = %topic, "topic created");

        Ok(())
    }

    /// Create a subscription attached to a topic. Idempotent: an existing
    /// subscription is success. Without an explicit deadline the client's
    /// configured acknowledgement deadline applies.
    pub async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
        ack_deadline_seconds: Option<u32>,
    ) -> Result<(), PubsubError> {
        if self
            .verify_subscriptions(std::slice::from_ref(subscription))
            .await?
        {
            debug!(subscription = %subscription, "subscription already exists");
            return Ok(());
        }

        let deadline =
            ack_deadline_seconds.unwrap_or_else(|| self.config.effective_ack_deadline_seconds());

        self.transport
            .create_subscription(subscription, topic, deadline)
            .await?;
        info!(subscription = %subscription, topic = %topic, "subscription created");

        Ok(())
    }
}

/// A pull response with no messages at all: null or an object with no keys
fn is_empty_response(response: &Value) -> bool {
    match response {
        Value::Null => true,
        Value::Object(object) => object.is_empty(),
        _ => false,
    }
}

/// Extract the `name` of every resource in a list response
fn resource_names(response: &Value, key: &str) -> Vec<String> {
    response
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name"))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Check that each wanted name is present, logging the first one missing
fn all_present<'a>(
    wanted: impl Iterator<Item = &'a str>,
    existing: &[String],
    kind: &str,
) -> bool {
    for name in wanted {
        if !existing.iter().any(|e| e == name) {
            error!(name = name, "could not find {} in the project", kind);
            return false;
        }
        debug!(name = name, "{} verified", kind);
    }
    true
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
