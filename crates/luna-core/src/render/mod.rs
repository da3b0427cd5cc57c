//! Manifest rendering
//!
//! A [`ManifestRenderer`] turns a task plus the cluster-side settings into the
//! resource documents that make up the task's pod.

mod tera_renderer;

use std::collections::BTreeMap;

use crate::cluster::Manifest;
use crate::config::LunaConfig;
use crate::error::LunaResult;
use crate::task::TaskSpec;

pub use tera_renderer::{TeraManifestRenderer, DEFAULT_TEMPLATE_NAME};

/// Environment variable carrying the workspace mount path into the stages
pub const WORKSPACE_ENV: &str = "LUNA_WORKSPACE";

/// Cluster-side inputs to rendering
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterContext {
    pub namespace: String,
    /// Mount path of the shared volume
    pub workspace_mount: String,
    /// Command run by the pre-task container before it waits for data
    pub setup_command: String,
    /// Image for the helper containers
    pub helper_image: String,
    pub completion_marker: String,
    /// Environment for the stage containers
    pub env: BTreeMap<String, String>,
}

impl ClusterContext {
    pub fn from_config(config: &LunaConfig) -> Self {
        let cluster = &config.cluster;
        let mut env = cluster.env.clone();
        env.insert("CI".to_string(), cluster.ci.clone());
        env.insert(WORKSPACE_ENV.to_string(), cluster.workspace_mount.clone());

        Self {
            namespace: cluster.namespace.clone(),
            workspace_mount: cluster.workspace_mount.clone(),
            setup_command: cluster.setup_command(),
            helper_image: cluster.helper_image.clone(),
            completion_marker: config.transfer.completion_marker.clone(),
            env,
        }
    }
}

/// Produces the resource documents for one task
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, task: &TaskSpec, cluster: &ClusterContext) -> LunaResult<Vec<Manifest>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_context_env() {
        let mut config = LunaConfig::default();
        config.cluster.ci = "true".to_string();
        config
            .cluster
            .env
            .insert("CI".to_string(), "overridden".to_string());
        config
            .cluster
            .env
            .insert("EXTRA".to_string(), "1".to_string());

        let context = ClusterContext::from_config(&config);
        assert_eq!(context.namespace, "default");
        assert_eq!(context.env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(
            context.env.get(WORKSPACE_ENV).map(String::as_str),
            Some("/workspace")
        );
        assert_eq!(context.env.get("EXTRA").map(String::as_str), Some("1"));
        assert_eq!(
            context.setup_command,
            "mkdir -p /workspace/model /workspace/eval /workspace/score"
        );
    }
}
