//! Cluster apply client port

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::exec::ExecChannel;
use super::manifest::Manifest;

/// Result type alias for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster error types
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The API server answered with an error
    #[error("Cluster API error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// The document cannot be applied as written
    #[error("Invalid manifest {resource}: {message}")]
    InvalidManifest { resource: String, message: String },

    /// The exec stream failed
    #[error("Exec channel error: {0}")]
    Exec(String),

    /// A container reached a state from which the awaited one is unreachable
    #[error("Container {container} in pod {pod} {message}")]
    UnexpectedState {
        pod: String,
        container: String,
        message: String,
    },

    /// The client could not be set up
    #[error("Cluster connection error: {0}")]
    Connection(String),
}

impl ClusterError {
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Identity of an applied resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// What the server returned for a successful create-or-update
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedObject {
    pub key: ResourceKey,
    /// Server-assigned object, as JSON
    pub object: serde_json::Value,
}

/// Lifecycle state of one container as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// Created but not started, or no state reported yet
    Waiting { reason: Option<String> },
    Running,
    Terminated { exit_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
}

impl ContainerStatus {
    pub fn new(name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// Observation of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodStatus {
    /// The pod does not exist (yet)
    NotFound,
    /// The pod exists but reports no container statuses yet
    Pending,
    /// Statuses of every container the platform reports, init containers first
    Containers(Vec<ContainerStatus>),
}

impl PodStatus {
    pub fn container(&self, name: &str) -> Option<&ContainerStatus> {
        match self {
            Self::Containers(statuses) => statuses.iter().find(|s| s.name == name),
            _ => None,
        }
    }
}

/// Capability object for everything the engine asks of the cluster
///
/// Create-or-update must be idempotent: applying the same document twice
/// leaves one resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApplyClient: Send + Sync {
    /// Create the resource or bring the existing one in line with the document
    async fn create_or_update(&self, manifest: &Manifest) -> ClusterResult<AppliedObject>;

    /// Delete the resource the document describes, cascading in the background
    async fn delete(&self, manifest: &Manifest, namespace: &str) -> ClusterResult<()>;

    async fn pod_status(&self, namespace: &str, pod_name: &str) -> ClusterResult<PodStatus>;

    /// Start `command` in a container and return its stream
    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecChannel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_display() {
        let key = ResourceKey::new("default", "Pod", "luna-1");
        assert_eq!(key.to_string(), "default/Pod/luna-1");
    }

    #[test]
    fn test_api_error_shows_status() {
        assert!(
            ClusterError::api(Some(409), "conflict")
                .to_string()
                .contains("(409)")
        );
    }

    #[test]
    fn test_pod_status_container_lookup() {
        let status = PodStatus::Containers(vec![
            ContainerStatus::new("pre-task", ContainerState::Running),
            ContainerStatus::new("task-1", ContainerState::Waiting { reason: None }),
        ]);
        assert_eq!(
            status.container("pre-task").map(|s| &s.state),
            Some(&ContainerState::Running)
        );
        assert!(status.container("post-task").is_none());
        assert!(PodStatus::Pending.container("pre-task").is_none());
    }
}
