//! Error types for Pub/Sub client operations.

use thiserror::Error;

/// Comprehensive error type for all Pub/Sub client operations
#[derive(Debug, Error)]
pub enum PubsubError {
    /// The subscription had no messages to deliver. This is the normal
    /// "nothing to do" signal, not a fault.
    #[error("No messages available in subscription '{subscription}'")]
    EmptyQueue { subscription: String },

    #[error("Gave up pulling after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Publish failed after {attempts} attempts")]
    PublishFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Publish was asked to send a message with neither attributes nor payload.
    #[error("Nothing to send: attributes and payload are both empty")]
    NothingToSend,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),
}

impl PubsubError {
    /// Check if error is transient and the operation is safe to retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmptyQueue { .. } => false,
            Self::RetriesExhausted { .. } => false,
            Self::PublishFailed { .. } => false,
            Self::NothingToSend => false,
            Self::Transport(e) => e.is_transient(),
            Self::Schema(_) => false,
            Self::Configuration(_) => false,
            Self::Path(_) => false,
        }
    }

    /// Check if this is the empty-queue signal rather than a fault
    pub fn is_empty_queue(&self) -> bool {
        matches!(self, Self::EmptyQueue { .. })
    }
}

/// Errors raised at the network boundary by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established. Covers TLS handshake failures
    /// surfaced by the connector.
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Response body could not be decoded: {message}")]
    InvalidBody { message: String },

    #[error("Request failed: {message}")]
    Request { message: String },

    #[error("Credential provider failed: {message}")]
    Credentials { message: String },
}

impl TransportError {
    /// Connection and handshake level failures are presumed recoverable;
    /// everything else propagates without a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::Timeout { .. } => true,
            Self::Status { .. } => false,
            Self::InvalidBody { .. } => false,
            Self::Request { .. } => false,
            Self::Credentials { .. } => false,
        }
    }
}

/// Errors from validating a pull response or extracting message fields.
///
/// Each structural check gets its own variant so a failure identifies the
/// exact field that was missing or malformed. A schema failure means no
/// other field of the envelope may be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Pull response is empty")]
    EmptyResponse,

    #[error("'receivedMessages' key not found in pull response")]
    MissingReceivedMessages,

    #[error("'receivedMessages' is not a list")]
    ReceivedMessagesNotAList,

    #[error("List of received messages is empty")]
    EmptyMessageList,

    #[error("First received message is not a structured record")]
    MessageNotARecord,

    #[error("'ackId' key not found in received message")]
    MissingAckId,

    #[error("'message' key not found in received message")]
    MissingMessage,

    #[error("'data' key not found in message")]
    MissingData,

    #[error("Message data is not valid base64: {message}")]
    InvalidBase64 { message: String },

    #[error("Message data is not valid UTF-8")]
    InvalidUtf8,

    #[error("Message data is not in JSON format: {message}")]
    MalformedPayload { message: String },

    #[error("Message data did not decode to a JSON object")]
    PayloadNotAnObject,

    #[error("Attribute '{key}' not found in message")]
    MissingAttribute { key: String },

    #[error("Key '{key}' not found in message data")]
    MissingPayloadKey { key: String },
}

/// Configuration errors raised at construction time; never retried
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Credential source '{path}' is unreadable: {message}")]
    CredentialsUnreadable { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors from building resource paths
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Project identifier cannot be empty")]
    EmptyProject,

    #[error("Resource name cannot be empty")]
    EmptyName,

    #[error("Path '{path}' is not a valid {expected} path")]
    InvalidResourcePath { path: String, expected: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
