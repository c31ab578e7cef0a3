//! Tests for the queue client, driven through a scripted transport double.

use super::*;
use crate::error::{SchemaError, TransportError};
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Scripted Transport Double
// ============================================================================

/// One recorded transport invocation
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Pull {
        subscription: String,
        max_messages: u32,
        return_immediately: bool,
    },
    Publish {
        topic: String,
        body: Value,
    },
    Ack {
        subscription: String,
        ack_ids: Vec<String>,
    },
    ListTopics,
    ListSubscriptions,
    CreateTopic {
        topic: String,
    },
    CreateSubscription {
        subscription: String,
        topic: String,
        ack_deadline_seconds: u32,
    },
}

/// Transport double with scripted responses and a call recording
struct ScriptedTransport {
    pulls: Mutex<VecDeque<Result<Value, TransportError>>>,
    publishes: Mutex<VecDeque<Result<Value, TransportError>>>,
    acks: Mutex<VecDeque<Result<(), TransportError>>>,
    topics_listing: Mutex<Value>,
    subscriptions_listing: Mutex<Value>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pulls: Mutex::new(VecDeque::new()),
            publishes: Mutex::new(VecDeque::new()),
            acks: Mutex::new(VecDeque::new()),
            topics_listing: Mutex::new(json!({})),
            subscriptions_listing: Mutex::new(json!({})),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn script_pull(&self, result: Result<Value, TransportError>) {
        self.pulls.lock().unwrap().push_back(result);
    }

    fn script_publish(&self, result: Result<Value, TransportError>) {
        self.publishes.lock().unwrap().push_back(result);
    }

    fn script_ack(&self, result: Result<(), TransportError>) {
        self.acks.lock().unwrap().push_back(result);
    }

    fn set_topics_listing(&self, listing: Value) {
        *self.topics_listing.lock().unwrap() = listing;
    }

    fn set_subscriptions_listing(&self, listing: Value) {
        *self.subscriptions_listing.lock().unwrap() = listing;
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: u32,
        return_immediately: bool,
    ) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call::Pull {
            subscription: subscription.to_string(),
            max_messages,
            return_immediately,
        });
        self.pulls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    async fn publish(&self, topic: &TopicPath, body: Value) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call::Publish {
            topic: topic.to_string(),
            body,
        });
        self.publishes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "messageIds": ["1"] })))
    }

    async fn acknowledge(
        &self,
        subscription: &SubscriptionPath,
        ack_ids: &[AckId],
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Ack {
            subscription: subscription.to_string(),
            ack_ids: ack_ids.iter().map(|id| id.as_str().to_string()).collect(),
        });
        self.acks.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn list_topics(&self, _project: &ProjectId) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call::ListTopics);
        Ok(self.topics_listing.lock().unwrap().clone())
    }

    async fn list_subscriptions(&self, _project: &ProjectId) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call::ListSubscriptions);
        Ok(self.subscriptions_listing.lock().unwrap().clone())
    }

    async fn create_topic(&self, topic: &TopicPath) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::CreateTopic {
            topic: topic.to_string(),
        });
        Ok(())
    }

    async fn create_subscription(
        &self,
        subscription: &SubscriptionPath,
        topic: &TopicPath,
        ack_deadline_seconds: u32,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::CreateSubscription {
            subscription: subscription.to_string(),
            topic: topic.to_string(),
            ack_deadline_seconds,
        });
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: 0.0,
    }
}

fn client_with(transport: Arc<ScriptedTransport>) -> PubsubClient {
    PubsubClient::with_transport(ClientConfig::new("foo"), transport)
        .unwrap()
        .with_retry_policy(fast_retry())
}

fn subscription() -> SubscriptionPath {
    SubscriptionPath::parse("projects/foo/subscriptions/workers").unwrap()
}

fn topic() -> TopicPath {
    TopicPath::parse("projects/foo/topics/results").unwrap()
}

fn connection_refused() -> TransportError {
    TransportError::ConnectionFailed {
        message: "connection refused".to_string(),
    }
}

fn forbidden() -> TransportError {
    TransportError::Status {
        status: 403,
        message: "forbidden".to_string(),
    }
}

fn encode(payload: &Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(payload.to_string().as_bytes())
}

fn pull_response(ack_id: &str, data: &str) -> Value {
    json!({
        "receivedMessages": [{
            "ackId": ack_id,
            "message": {
                "messageId": "msg-1",
                "publishTime": "2026-08-27T10:00:00Z",
                "attributes": { "job": "convert" },
                "data": data,
            }
        }]
    })
}

fn valid_pull_response(ack_id: &str) -> Value {
    pull_response(ack_id, &encode(&json!({ "path": "/srv/in/file.fh" })))
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_pull_returns_validated_envelope() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(valid_pull_response("ack-1")));
    let client = client_with(transport.clone());

    let envelope = client.pull(&subscription()).await.unwrap();

    assert_eq!(envelope.ack_id().as_str(), "ack-1");
    assert_eq!(
        transport.calls(),
        vec![Call::Pull {
            subscription: subscription().to_string(),
            max_messages: 1,
            return_immediately: true,
        }]
    );
}

#[tokio::test]
async fn test_pull_expiry_reserves_thirty_second_buffer() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(valid_pull_response("ack-1")));
    let client = client_with(transport);

    let before = Utc::now();
    let envelope = client.pull(&subscription()).await.unwrap();

    // ack deadline 600 gives an expiry 570 seconds out
    let seconds = (envelope.expire_at().as_datetime() - before).num_seconds();
    assert!((569..=571).contains(&seconds), "expiry was {}s out", seconds);
}

#[tokio::test]
async fn test_pull_expiry_skips_buffer_for_short_deadlines() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(valid_pull_response("ack-1")));
    let config = ClientConfig::new("foo").with_ack_deadline_seconds(10);
    let client = PubsubClient::with_transport(config, transport).unwrap();

    let before = Utc::now();
    let envelope = client.pull(&subscription()).await.unwrap();

    let seconds = (envelope.expire_at().as_datetime() - before).num_seconds();
    assert!((9..=11).contains(&seconds), "expiry was {}s out", seconds);
}

#[tokio::test]
async fn test_pull_empty_response_is_empty_queue() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(json!({})));
    let client = client_with(transport);

    let err = client.pull(&subscription()).await.unwrap_err();
    assert!(err.is_empty_queue());
}

#[tokio::test]
async fn test_pull_retries_transient_failures() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Err(connection_refused()));
    transport.script_pull(Ok(valid_pull_response("ack-1")));
    let client = client_with(transport.clone());

    let envelope = client.pull(&subscription()).await.unwrap();

    assert_eq!(envelope.ack_id().as_str(), "ack-1");
    assert_eq!(transport.count(|c| matches!(c, Call::Pull { .. })), 2);
}

#[tokio::test]
async fn test_pull_stops_after_max_retries() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.script_pull(Err(connection_refused()));
    }
    let client = client_with(transport.clone());

    let err = client.pull(&subscription()).await.unwrap_err();

    match err {
        PubsubError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got: {:?}", other),
    }
    assert_eq!(transport.count(|c| matches!(c, Call::Pull { .. })), 3);
}

#[tokio::test]
async fn test_pull_fatal_error_is_not_retried() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Err(forbidden()));
    let client = client_with(transport.clone());

    let err = client.pull(&subscription()).await.unwrap_err();

    assert!(matches!(
        err,
        PubsubError::Transport(TransportError::Status { status: 403, .. })
    ));
    assert_eq!(transport.count(|c| matches!(c, Call::Pull { .. })), 1);
}

#[tokio::test]
async fn test_pull_rejects_malformed_envelope() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(json!({ "receivedMessages": "nope" })));
    let client = client_with(transport);

    let err = client.pull(&subscription()).await.unwrap_err();
    assert!(matches!(
        err,
        PubsubError::Schema(SchemaError::ReceivedMessagesNotAList)
    ));
}

// ============================================================================
// Acknowledge
// ============================================================================

#[tokio::test]
async fn test_ack_sends_all_ids_in_one_call() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    let ids = [AckId::from("a"), AckId::from("b")];
    client.ack(&subscription(), &ids).await.unwrap();

    assert_eq!(
        transport.calls(),
        vec![Call::Ack {
            subscription: subscription().to_string(),
            ack_ids: vec!["a".to_string(), "b".to_string()],
        }]
    );
}

#[tokio::test]
async fn test_ack_one_normalizes_to_a_list() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    client
        .ack_one(&subscription(), &AckId::from("solo"))
        .await
        .unwrap();

    assert_eq!(
        transport.calls(),
        vec![Call::Ack {
            subscription: subscription().to_string(),
            ack_ids: vec!["solo".to_string()],
        }]
    );
}

#[tokio::test]
async fn test_ack_with_no_ids_skips_the_network() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    client.ack(&subscription(), &[]).await.unwrap();

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_ack_is_idempotent_from_the_client_side() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    // No local state tracks prior acks; the same id acks twice cleanly
    let id = AckId::from("same-id");
    client.ack_one(&subscription(), &id).await.unwrap();
    client.ack_one(&subscription(), &id).await.unwrap();

    assert_eq!(transport.count(|c| matches!(c, Call::Ack { .. })), 2);
}

// ============================================================================
// Publish
// ============================================================================

#[tokio::test]
async fn test_publish_requires_attributes_or_payload() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    let err = client
        .publish(&topic(), Attributes::new(), Payload::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PubsubError::NothingToSend));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_publish_encodes_the_wire_body() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    let mut attributes = Attributes::new();
    attributes.insert("job".to_string(), "convert".to_string());
    let mut payload = Payload::new();
    payload.insert("path".to_string(), json!("/srv/in/file.fh"));

    client
        .publish(&topic(), attributes, payload)
        .await
        .unwrap();

    let calls = transport.calls();
    let body = match &calls[0] {
        Call::Publish { topic, body } => {
            assert_eq!(topic, "projects/foo/topics/results");
            body
        }
        other => panic!("expected Publish call, got: {:?}", other),
    };

    let message = &body["messages"][0];
    assert_eq!(message["attributes"]["job"], "convert");

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(message["data"].as_str().unwrap())
        .unwrap();
    let decoded: Value = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(decoded["path"], "/srv/in/file.fh");
}

#[tokio::test]
async fn test_publish_retries_transient_failures() {
    let transport = ScriptedTransport::new();
    transport.script_publish(Err(connection_refused()));
    let client = client_with(transport.clone());

    let mut payload = Payload::new();
    payload.insert("k".to_string(), json!(1));
    client
        .publish(&topic(), Attributes::new(), payload)
        .await
        .unwrap();

    assert_eq!(transport.count(|c| matches!(c, Call::Publish { .. })), 2);
}

#[tokio::test]
async fn test_publish_surfaces_fatal_errors_immediately() {
    let transport = ScriptedTransport::new();
    transport.script_publish(Err(forbidden()));
    let client = client_with(transport.clone());

    let mut payload = Payload::new();
    payload.insert("k".to_string(), json!(1));
    let err = client
        .publish(&topic(), Attributes::new(), payload)
        .await
        .unwrap_err();

    assert!(matches!(err, PubsubError::Transport(_)));
    assert_eq!(transport.count(|c| matches!(c, Call::Publish { .. })), 1);
}

#[tokio::test]
async fn test_publish_gives_up_after_max_attempts() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.script_publish(Err(connection_refused()));
    }
    let client = client_with(transport.clone());

    let mut payload = Payload::new();
    payload.insert("k".to_string(), json!(1));
    let err = client
        .publish(&topic(), Attributes::new(), payload)
        .await
        .unwrap_err();

    match err {
        PubsubError::PublishFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected PublishFailed, got: {:?}", other),
    }
}

// ============================================================================
// Requeue
// ============================================================================

#[tokio::test]
async fn test_requeue_on_empty_queue_is_a_clean_no_op() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(json!({})));
    let client = client_with(transport.clone());

    let moved = client.requeue(&subscription(), &topic()).await.unwrap();

    assert!(!moved);
    assert_eq!(transport.count(|c| matches!(c, Call::Publish { .. })), 0);
    assert_eq!(transport.count(|c| matches!(c, Call::Ack { .. })), 0);
}

#[tokio::test]
async fn test_requeue_moves_a_valid_message() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(valid_pull_response("ack-move")));
    let client = client_with(transport.clone());

    let moved = client.requeue(&subscription(), &topic()).await.unwrap();
    assert!(moved);

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], Call::Pull { .. }));

    // Exactly one publish carrying the original attributes and payload
    match &calls[1] {
        Call::Publish { body, .. } => {
            assert_eq!(body["messages"][0]["attributes"]["job"], "convert");
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(body["messages"][0]["data"].as_str().unwrap())
                .unwrap();
            let decoded: Value = serde_json::from_slice(&decoded).unwrap();
            assert_eq!(decoded["path"], "/srv/in/file.fh");
        }
        other => panic!("expected Publish, got: {:?}", other),
    }

    // Followed by exactly one ack on the original id
    match &calls[2] {
        Call::Ack { ack_ids, .. } => assert_eq!(ack_ids, &vec!["ack-move".to_string()]),
        other => panic!("expected Ack, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_requeue_drains_a_corrupt_message() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(pull_response("ack-corrupt", "!!!not base64!!!")));
    let client = client_with(transport.clone());

    let err = client.requeue(&subscription(), &topic()).await.unwrap_err();

    assert!(matches!(
        err,
        PubsubError::Schema(SchemaError::InvalidBase64 { .. })
    ));
    assert_eq!(transport.count(|c| matches!(c, Call::Publish { .. })), 0);
    assert_eq!(
        transport.calls().iter().filter(|c| matches!(c, Call::Ack { .. })).count(),
        1
    );
    match transport
        .calls()
        .iter()
        .find(|c| matches!(c, Call::Ack { .. }))
        .unwrap()
    {
        Call::Ack { ack_ids, .. } => assert_eq!(ack_ids, &vec!["ack-corrupt".to_string()]),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_requeue_surfaces_extraction_error_even_when_drain_ack_fails() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(pull_response("ack-corrupt", "!!!not base64!!!")));
    transport.script_ack(Err(forbidden()));
    let client = client_with(transport);

    let err = client.requeue(&subscription(), &topic()).await.unwrap_err();

    // The extraction failure matters more to the caller than the ack error
    assert!(matches!(err, PubsubError::Schema(_)));
}

#[tokio::test]
async fn test_requeue_leaves_message_unacked_when_publish_fails() {
    let transport = ScriptedTransport::new();
    transport.script_pull(Ok(valid_pull_response("ack-keep")));
    transport.script_publish(Err(forbidden()));
    let client = client_with(transport.clone());

    let err = client.requeue(&subscription(), &topic()).await.unwrap_err();

    assert!(matches!(err, PubsubError::Transport(_)));
    // The original stays pending for redelivery; no ack was sent
    assert_eq!(transport.count(|c| matches!(c, Call::Ack { .. })), 0);
}

// ============================================================================
// Delegated Administration
// ============================================================================

#[tokio::test]
async fn test_verify_topics_checks_every_name() {
    let transport = ScriptedTransport::new();
    transport.set_topics_listing(json!({
        "topics": [
            { "name": "projects/foo/topics/a" },
            { "name": "projects/foo/topics/b" },
        ]
    }));
    let client = client_with(transport.clone());

    let both = client.project().topics(&["a", "b"]).unwrap();
    assert!(client.verify_topics(&both).await.unwrap());

    let missing = client.project().topics(&["a", "c"]).unwrap();
    assert!(!client.verify_topics(&missing).await.unwrap());
}

#[tokio::test]
async fn test_verify_topics_with_no_topics_in_project() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport);

    let wanted = client.project().topics(&["a"]).unwrap();
    assert!(!client.verify_topics(&wanted).await.unwrap());
}

#[tokio::test]
async fn test_verify_subscriptions() {
    let transport = ScriptedTransport::new();
    transport.set_subscriptions_listing(json!({
        "subscriptions": [{ "name": "projects/foo/subscriptions/workers" }]
    }));
    let client = client_with(transport);

    let present = client.project().subscriptions(&["workers"]).unwrap();
    assert!(client.verify_subscriptions(&present).await.unwrap());

    let absent = client.project().subscriptions(&["other"]).unwrap();
    assert!(!client.verify_subscriptions(&absent).await.unwrap());
}

#[tokio::test]
async fn test_create_topic_is_idempotent() {
    let transport = ScriptedTransport::new();
    transport.set_topics_listing(json!({
        "topics": [{ "name": "projects/foo/topics/results" }]
    }));
    let client = client_with(transport.clone());

    client.create_topic(&topic()).await.unwrap();
    assert_eq!(transport.count(|c| matches!(c, Call::CreateTopic { .. })), 0);

    transport.set_topics_listing(json!({}));
    client.create_topic(&topic()).await.unwrap();
    assert_eq!(transport.count(|c| matches!(c, Call::CreateTopic { .. })), 1);
}

#[tokio::test]
async fn test_create_subscription_uses_configured_deadline() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    client
        .create_subscription(&subscription(), &topic(), None)
        .await
        .unwrap();

    match transport
        .calls()
        .iter()
        .find(|c| matches!(c, Call::CreateSubscription { .. }))
        .unwrap()
    {
        Call::CreateSubscription {
            topic: t,
            ack_deadline_seconds,
            ..
        } => {
            assert_eq!(t, "projects/foo/topics/results");
            assert_eq!(*ack_deadline_seconds, 600);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_create_subscription_accepts_explicit_deadline() {
    let transport = ScriptedTransport::new();
    let client = client_with(transport.clone());

    client
        .create_subscription(&subscription(), &topic(), Some(120))
        .await
        .unwrap();

    assert!(transport.calls().iter().any(|c| matches!(
        c,
        Call::CreateSubscription {
            ack_deadline_seconds: 120,
            ..
        }
    )));
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_construction_fails_without_project() {
    let transport = ScriptedTransport::new();
    let result = PubsubClient::with_transport(ClientConfig::new(""), transport);

    assert!(matches!(
        result.unwrap_err(),
        PubsubError::Configuration(_)
    ));
}

#[tokio::test]
async fn test_client_normalizes_project_prefix() {
    let transport = ScriptedTransport::new();
    let client =
        PubsubClient::with_transport(ClientConfig::new("projects/foo"), transport).unwrap();

    assert_eq!(client.project().as_path(), "projects/foo");
}
