//! Configuration model

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::logging_config::LoggingConfig;
use crate::error::{LunaError, LunaResult};

/// Top-level Luna configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LunaConfig {
    pub cluster: ClusterConfig,
    pub polling: PollingConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl LunaConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> LunaResult<()> {
        if self.cluster.namespace.trim().is_empty() {
            return Err(LunaError::config("cluster.namespace must not be empty"));
        }
        if self.cluster.helper_image.trim().is_empty() {
            return Err(LunaError::config("cluster.helper_image must not be empty"));
        }
        for (field, path) in [
            ("cluster.workspace_mount", &self.cluster.workspace_mount),
            ("transfer.completion_marker", &self.transfer.completion_marker),
        ] {
            if !path.starts_with('/') {
                return Err(LunaError::config_with_context(
                    format!("{} must be an absolute path, got '{}'", field, path),
                    "Validating configuration",
                ));
            }
        }
        for (field, interval) in [
            ("polling.pending_interval", self.polling.pending_interval),
            ("polling.poll_interval", self.polling.poll_interval),
            ("polling.channel_poll_timeout", self.polling.channel_poll_timeout),
        ] {
            if interval.is_zero() {
                return Err(LunaError::config(format!("{} must be greater than zero", field)));
            }
        }
        if self.transfer.spool_threshold == 0 {
            return Err(LunaError::config(
                "transfer.spool_threshold must be greater than zero",
            ));
        }
        if !self.logging.is_valid_format() {
            return Err(LunaError::config(format!(
                "Unknown log format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Cluster-side settings used when rendering and driving the pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Namespace pods are created in
    pub namespace: String,
    /// Image for the pre-task, post-task and completion containers
    pub helper_image: String,
    /// Mount path of the volume shared by every container
    pub workspace_mount: String,
    pub model_path: String,
    pub eval_path: String,
    pub score_path: String,
    /// Value forwarded as `CI` into the pod
    pub ci: String,
    /// Extra environment variables for the stage containers
    pub env: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            helper_image: "bash:5.2".to_string(),
            workspace_mount: "/workspace".to_string(),
            model_path: "/workspace/model".to_string(),
            eval_path: "/workspace/eval".to_string(),
            score_path: "/workspace/score".to_string(),
            ci: "false".to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl ClusterConfig {
    /// Shell command that prepares the workspace layout
    pub fn setup_command(&self) -> String {
        let dirs = [&self.model_path, &self.eval_path, &self.score_path]
            .iter()
            .map(|p| shell_words::quote(p).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        format!("mkdir -p {}", dirs)
    }
}

/// Poll loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval while the pod, its status or the container is not visible yet
    #[serde(with = "humantime_serde")]
    pub pending_interval: Duration,
    /// Interval while the container is visible but not in the target state
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long one exec channel poll waits for output
    #[serde(with = "humantime_serde")]
    pub channel_poll_timeout: Duration,
    /// Upper bound for a single container wait; unbounded when absent
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            pending_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            channel_poll_timeout: Duration::from_secs(1),
            deadline: None,
        }
    }
}

/// File transfer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// File touched in the container after each transfer step
    pub completion_marker: String,
    /// Bytes kept in memory before temporary buffers spill to disk
    pub spool_threshold: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            completion_marker: "/tmp/done".to_string(),
            spool_threshold: 16 * 1024 * 1024,
        }
    }
}

/// Local storage backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; `~` is expanded
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
        }
    }
}

impl StorageConfig {
    pub fn resolved_root(&self) -> PathBuf {
        let raw = self.root.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }
}
