//! # Pubsub Runtime
//!
//! Client runtime for a pull-based, at-least-once message queue speaking
//! the Pub/Sub JSON wire dialect.
//!
//! This library provides:
//! - Single-message pull with transient-failure retry and a local expiry
//! - Parse-time envelope validation with field-level diagnostics
//! - Typed attribute and payload extraction
//! - Acknowledge and publish operations
//! - A loss-safe requeue (republish then acknowledge the original)
//!
//! ## Module Organization
//!
//! - [`error`] - Error taxonomy for all client operations
//! - [`message`] - Envelope, accessors, and publish wire encoding
//! - [`path`] - Project, topic, and subscription path construction
//! - [`config`] - Client configuration with defaults and validation
//! - [`auth`] - Credential provider port
//! - [`transport`] - Network boundary trait and HTTP implementation
//! - [`retry`] - Backoff policy for transient failures
//! - [`client`] - The queue client itself
//!
//! The queue is at-least-once. Duplicates are possible, ordering across
//! messages is not guaranteed, and every operation handles one message per
//! pull cycle.

// Module declarations
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod path;
pub mod retry;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use auth::{FileTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::PubsubClient;
pub use config::ClientConfig;
pub use error::{ConfigurationError, PathError, PubsubError, SchemaError, TransportError};
pub use message::{AckId, Attributes, Envelope, Payload, Timestamp};
pub use path::{ProjectId, ResourceKind, SubscriptionPath, TopicPath};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport};
