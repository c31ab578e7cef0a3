//! Credential provider port.
//!
//! Token acquisition and refresh live outside this crate; the client only
//! needs something that yields a bearer token for the authorization header.
//! The file-backed provider checks its source at construction so a missing
//! or unreadable credential file fails fast instead of on the first call.

use crate::error::{ConfigurationError, TransportError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Supplier of bearer tokens for authenticated transport calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Yield a token valid for at least the next request
    async fn bearer_token(&self) -> Result<String, TransportError>;
}

/// Provider serving a fixed, pre-acquired token. Useful for tests and for
/// callers that manage token refresh themselves.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, TransportError> {
        Ok(self.token.clone())
    }
}

/// Provider backed by a token file, re-read on every request so an external
/// refresher can rotate the file contents underneath a running client.
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Create a provider for the given token file. The file must exist and
    /// be readable now; a broken credential source is a configuration error,
    /// not something to retry later.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();

        std::fs::read_to_string(&path).map_err(|e| ConfigurationError::CredentialsUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { path })
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn bearer_token(&self) -> Result<String, TransportError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            TransportError::Credentials {
                message: format!("token file '{}': {}", self.path.display(), e),
            }
        })?;

        Ok(contents.trim().to_string())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
