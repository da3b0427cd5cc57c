//! Core error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::cluster::{ClusterError, ResourceKey};
use crate::storage::StorageError;

/// Result type alias for engine operations
pub type LunaResult<T> = Result<T, LunaError>;

/// One document of a manifest batch that could not be applied, or could not be
/// deleted again during rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    /// Position of the document in the rendered batch
    pub index: usize,
    /// `kind/name` of the document as rendered, when it had one
    pub resource: Option<String>,
    /// Error reported by the cluster
    pub message: String,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "document #{} ({}): {}", self.index, resource, self.message),
            None => write!(f, "document #{}: {}", self.index, self.message),
        }
    }
}

impl ApplyFailure {
    pub(crate) fn for_key(index: usize, key: &ResourceKey, message: impl Into<String>) -> Self {
        Self {
            index,
            resource: Some(format!("{}/{}", key.kind, key.name)),
            message: message.into(),
        }
    }
}

fn join_failures(failures: &[ApplyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn rollback_suffix(rollback_failures: &[ApplyFailure]) -> String {
    if rollback_failures.is_empty() {
        String::new()
    } else {
        format!(
            "; rollback left {} resource(s) behind: {}",
            rollback_failures.len(),
            join_failures(rollback_failures)
        )
    }
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum LunaError {
    /// The task description violates its construction contract
    #[error("Invalid task: {message}")]
    InvalidTask {
        message: String,
        field: Option<String>,
    },

    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// The manifest template could not be rendered or parsed
    #[error("Manifest render error: {message}")]
    Render { message: String },

    /// One or more documents of a batch failed to apply; the batch was rolled back
    #[error(
        "Failed to apply {} manifest document(s): {}{}",
        .failures.len(),
        join_failures(.failures),
        rollback_suffix(.rollback_failures)
    )]
    ManifestApply {
        failures: Vec<ApplyFailure>,
        rollback_failures: Vec<ApplyFailure>,
    },

    /// Cluster API failure after the pod was started
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Storage backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Copy-in or copy-out could not be completed
    #[error("Transfer error: {message}")]
    Transfer {
        message: String,
        path: Option<String>,
    },

    /// A container did not reach the awaited state before the deadline
    #[error("Timed out after {waited:?} waiting for container {container} in pod {pod} to {condition}")]
    Timeout {
        pod: String,
        container: String,
        condition: String,
        waited: Duration,
    },

    /// The evaluation was cancelled
    #[error("Evaluation was cancelled")]
    Cancelled,
}

impl LunaError {
    /// Stable code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTask { .. } => "LUNA_INVALID_TASK",
            Self::Config { .. } => "LUNA_CONFIG",
            Self::Render { .. } => "LUNA_RENDER",
            Self::ManifestApply { .. } => "LUNA_MANIFEST_APPLY",
            Self::Cluster(_) => "LUNA_CLUSTER",
            Self::Storage(_) => "LUNA_STORAGE",
            Self::Transfer { .. } => "LUNA_TRANSFER",
            Self::Timeout { .. } => "LUNA_TIMEOUT",
            Self::Cancelled => "LUNA_CANCELLED",
        }
    }
}

impl From<tera::Error> for LunaError {
    fn from(err: tera::Error) -> Self {
        // tera keeps the interesting part in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Render { message }
    }
}

impl From<serde_yaml::Error> for LunaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render {
            message: format!("rendered manifest is not valid YAML: {}", err),
        }
    }
}
