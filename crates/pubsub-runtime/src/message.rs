//! Message types: the validated pull envelope, field accessors, and the
//! publish wire encoding.
//!
//! A pull response arrives as loosely typed JSON. [`Envelope::parse`] is the
//! single validation gate: it walks the structural checks in a fixed order,
//! each failure mapping to its own [`SchemaError`] variant, and produces a
//! typed [`Envelope`] that the accessors operate on. Once parsing succeeds
//! the acknowledgement id is guaranteed present; attribute and payload
//! extraction stay fallible because they depend on per-caller requirements
//! and on the payload actually being well-formed base64 JSON.

use crate::error::SchemaError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// Key holding the message list in a pull response
const RECEIVED_MESSAGES_KEY: &str = "receivedMessages";

/// Message attributes: string keys mapped to string values
pub type Attributes = HashMap<String, String>;

/// A decoded message payload: an arbitrary JSON object
pub type Payload = Map<String, Value>;

// ============================================================================
// Core Identifiers
// ============================================================================

/// Opaque acknowledgement id, unique per delivery (not per logical message;
/// a redelivery carries a fresh id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckId(String);

impl AckId {
    /// Get the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AckId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AckId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create a timestamp this many seconds into the future
    pub fn seconds_from_now(seconds: i64) -> Self {
        Self(Utc::now() + Duration::seconds(seconds))
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// One validated delivery pulled from a subscription.
///
/// An `Envelope` only exists after [`Envelope::parse`] has accepted the raw
/// pull response, so every instance carries a trustworthy acknowledgement id
/// and a locally computed expiry. It lives in memory for the duration of one
/// processing cycle (pull, act, ack) and is never persisted.
#[derive(Debug, Clone)]
pub struct Envelope {
    ack_id: AckId,
    message_id: Option<String>,
    publish_time: Option<String>,
    attributes: Option<Attributes>,
    /// Still base64 as it came off the wire; decoded lazily by [`Envelope::data`]
    data: String,
    expire_at: Timestamp,
}

impl Envelope {
    /// Validate a raw pull response and produce a typed envelope.
    ///
    /// The checks run in a fixed order, each with its own error variant:
    /// response non-empty, message list present, is a list, non-empty, first
    /// element is a record, has an `ackId`, has a nested `message`, and the
    /// message has a `data` field. Any failure means no field of the
    /// response may be trusted.
    ///
    /// `expire_at` is the locally computed expiry to attach; it is not part
    /// of the wire format.
    pub fn parse(response: &Value, expire_at: Timestamp) -> Result<Self, SchemaError> {
        let object = match response {
            Value::Object(object) if !object.is_empty() => object,
            _ => return Err(SchemaError::EmptyResponse),
        };

        let list = object
            .get(RECEIVED_MESSAGES_KEY)
            .ok_or(SchemaError::MissingReceivedMessages)?;

        let list = list.as_array().ok_or(SchemaError::ReceivedMessagesNotAList)?;

        let first = list.first().ok_or(SchemaError::EmptyMessageList)?;

        let record = first.as_object().ok_or(SchemaError::MessageNotARecord)?;

        let ack_id = record
            .get("ackId")
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingAckId)?;

        let message = record
            .get("message")
            .and_then(Value::as_object)
            .ok_or(SchemaError::MissingMessage)?;

        let data = message
            .get("data")
            .and_then(Value::as_str)
            .ok_or(SchemaError::MissingData)?;

        let attributes = message.get("attributes").and_then(Value::as_object).map(|a| {
            a.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        });

        Ok(Self {
            ack_id: AckId::from(ack_id),
            message_id: message
                .get("messageId")
                .and_then(Value::as_str)
                .map(str::to_string),
            publish_time: message
                .get("publishTime")
                .and_then(Value::as_str)
                .map(str::to_string),
            attributes,
            data: data.to_string(),
            expire_at,
        })
    }

    /// The acknowledgement id for this delivery
    pub fn ack_id(&self) -> &AckId {
        &self.ack_id
    }

    /// Server-assigned message id, when present
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Time the message was originally published, when present
    pub fn publish_time(&self) -> Option<&str> {
        self.publish_time.as_deref()
    }

    /// Deadline after which this delivery should be treated as abandoned
    pub fn expire_at(&self) -> Timestamp {
        self.expire_at
    }

    /// Extract the message attributes.
    ///
    /// A message without attributes yields an empty map, not an error. When
    /// `required` names keys, every one of them must be present.
    pub fn attributes(&self, required: &[&str]) -> Result<Attributes, SchemaError> {
        let attributes = self.attributes.clone().unwrap_or_default();

        for key in required {
            if !attributes.contains_key(*key) {
                return Err(SchemaError::MissingAttribute {
                    key: (*key).to_string(),
                });
            }
        }

        Ok(attributes)
    }

    /// Decode the message payload: base64, then UTF-8, then JSON object.
    ///
    /// Each decoding stage fails with its own error variant so a corrupt
    /// payload is diagnosable. When `required` names keys, every one of them
    /// must be present in the decoded object.
    pub fn data(&self, required: &[&str]) -> Result<Payload, SchemaError> {
        let raw = general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| SchemaError::InvalidBase64 {
                message: e.to_string(),
            })?;

        let text = String::from_utf8(raw).map_err(|_| SchemaError::InvalidUtf8)?;

        let value: Value =
            serde_json::from_str(&text).map_err(|e| SchemaError::MalformedPayload {
                message: e.to_string(),
            })?;

        let payload = match value {
            Value::Object(payload) => payload,
            _ => return Err(SchemaError::PayloadNotAnObject),
        };

        for key in required {
            if !payload.contains_key(*key) {
                return Err(SchemaError::MissingPayloadKey {
                    key: (*key).to_string(),
                });
            }
        }

        Ok(payload)
    }
}

// ============================================================================
// Publish Encoding
// ============================================================================

/// Encode a payload object for the wire: JSON text with deterministically
/// ordered keys, UTF-8 encoded, then base64.
///
/// Key ordering comes from `serde_json`'s default `BTreeMap`-backed object
/// representation, so the same payload always encodes to the same bytes.
pub fn encode_payload(payload: &Payload) -> String {
    let text = Value::Object(payload.clone()).to_string();
    general_purpose::STANDARD.encode(text.as_bytes())
}

/// Build the publish request body for a single message.
///
/// Empty attributes or payload are omitted from the wire shape entirely
/// rather than sent as empty fields.
pub fn encode_publish_body(attributes: &Attributes, payload: &Payload) -> Value {
    let mut message = Map::new();

    if !attributes.is_empty() {
        let attrs: Map<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        message.insert("attributes".to_string(), Value::Object(attrs));
    }

    if !payload.is_empty() {
        message.insert("data".to_string(), Value::String(encode_payload(payload)));
    }

    serde_json::json!({ "messages": [message] })
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
