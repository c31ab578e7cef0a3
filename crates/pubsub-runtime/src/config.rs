//! Client configuration with defaults and construction-time validation.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default service endpoint
pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Default API version selector; opaque to the client logic
pub const DEFAULT_API_VERSION: &str = "v1";

/// Default ceiling on transient-failure re-attempts for a single pull
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bound on how long one network attempt may block
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-side maximum acknowledgement deadline; larger values are clamped
pub const MAX_ACK_DEADLINE_SECONDS: u32 = 600;

/// Configuration for a [`PubsubClient`](crate::client::PubsubClient).
///
/// Set once at construction and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project that owns the topics and subscriptions. May be a short name
    /// or an already qualified `projects/{name}` path.
    pub project: String,
    /// Base URL of the queue service
    pub endpoint: String,
    /// API version path segment
    pub api_version: String,
    /// Hard ceiling on transient-failure re-attempts for a single pull
    pub max_retries: u32,
    /// Caps how long a single network attempt may block
    pub socket_timeout: Duration,
    /// Seconds before the server redelivers an un-acked message; clamped to
    /// [`MAX_ACK_DEADLINE_SECONDS`]
    pub ack_deadline_seconds: u32,
}

impl ClientConfig {
    /// Create a configuration for the given project with all defaults
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            ack_deadline_seconds: MAX_ACK_DEADLINE_SECONDS,
        }
    }

    /// Override the service endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the API version
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Override the pull retry ceiling
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the per-attempt network timeout
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Override the acknowledgement deadline (seconds). Values above the
    /// server maximum are clamped, not rejected.
    pub fn with_ack_deadline_seconds(mut self, seconds: u32) -> Self {
        self.ack_deadline_seconds = seconds;
        self
    }

    /// The acknowledgement deadline after clamping to the server maximum
    pub fn effective_ack_deadline_seconds(&self) -> u32 {
        self.ack_deadline_seconds.min(MAX_ACK_DEADLINE_SECONDS)
    }

    /// Validate the configuration. Fails fast; configuration errors are
    /// never retried.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.project.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "project".to_string(),
            });
        }

        if self.endpoint.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "endpoint".to_string(),
            });
        }

        url::Url::parse(&self.endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("endpoint '{}' is not a valid URL: {}", self.endpoint, e),
        })?;

        if self.max_retries == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_retries must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
