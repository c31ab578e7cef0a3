//! Resource path construction for projects, topics, and subscriptions.
//!
//! The queue service addresses every resource with a long-form path of the
//! shape `projects/{project}/{kind}/{name}`. This module builds those paths
//! from short names and a project identifier, without ever doubling the
//! `projects/` prefix when the identifier already carries one.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix that starts every fully qualified resource path
const PROJECT_PREFIX: &str = "projects/";

/// The kind segment of a resource path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Topics,
    Subscriptions,
}

impl ResourceKind {
    /// Get the path segment for this kind
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Topics => "topics",
            Self::Subscriptions => "subscriptions",
        }
    }
}

/// A project identifier, normalized to its fully qualified `projects/{id}` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a project identifier from either a short name (`my-project`)
    /// or an already qualified path (`projects/my-project`).
    pub fn new(id: &str) -> Result<Self, PathError> {
        if id.is_empty() {
            return Err(PathError::EmptyProject);
        }

        // If the prefix is already on the project, don't add a second one
        if id.starts_with(PROJECT_PREFIX) {
            Ok(Self(id.to_string()))
        } else {
            Ok(Self(format!("{}{}", PROJECT_PREFIX, id)))
        }
    }

    /// Get the fully qualified project path
    pub fn as_path(&self) -> &str {
        &self.0
    }

    /// Build a fully qualified path for a single named resource
    pub fn resource_path(&self, kind: ResourceKind, name: &str) -> Result<String, PathError> {
        if name.is_empty() {
            return Err(PathError::EmptyName);
        }
        Ok(format!("{}/{}/{}", self.0, kind.segment(), name))
    }

    /// Build fully qualified paths for several named resources at once
    pub fn resource_paths(
        &self,
        kind: ResourceKind,
        names: &[&str],
    ) -> Result<Vec<String>, PathError> {
        names
            .iter()
            .map(|name| self.resource_path(kind, name))
            .collect()
    }

    /// Build the full path for a topic in this project
    pub fn topic(&self, name: &str) -> Result<TopicPath, PathError> {
        Ok(TopicPath(self.resource_path(ResourceKind::Topics, name)?))
    }

    /// Build the full path for a subscription in this project
    pub fn subscription(&self, name: &str) -> Result<SubscriptionPath, PathError> {
        Ok(SubscriptionPath(
            self.resource_path(ResourceKind::Subscriptions, name)?,
        ))
    }

    /// Build full topic paths for several short names
    pub fn topics(&self, names: &[&str]) -> Result<Vec<TopicPath>, PathError> {
        names.iter().map(|name| self.topic(name)).collect()
    }

    /// Build full subscription paths for several short names
    pub fn subscriptions(&self, names: &[&str]) -> Result<Vec<SubscriptionPath>, PathError> {
        names.iter().map(|name| self.subscription(name)).collect()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Fully qualified topic path (`projects/{project}/topics/{name}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPath(String);

impl TopicPath {
    /// Accept an already fully qualified topic path
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if !path.starts_with(PROJECT_PREFIX) || !path.contains("/topics/") {
            return Err(PathError::InvalidResourcePath {
                path: path.to_string(),
                expected: "topic".to_string(),
            });
        }
        Ok(Self(path.to_string()))
    }

    /// Get the path as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TopicPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Fully qualified subscription path (`projects/{project}/subscriptions/{name}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionPath(String);

impl SubscriptionPath {
    /// Accept an already fully qualified subscription path
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if !path.starts_with(PROJECT_PREFIX) || !path.contains("/subscriptions/") {
            return Err(PathError::InvalidResourcePath {
                path: path.to_string(),
                expected: "subscription".to_string(),
            });
        }
        Ok(Self(path.to_string()))
    }

    /// Get the path as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
