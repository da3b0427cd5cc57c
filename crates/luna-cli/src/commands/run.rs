//! `luna run`: evaluate one task on the cluster

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use luna_core::{Executor, KubeClusterClient, LocalFsStorage, LunaConfig};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{build_renderer, load_task};
use crate::console::CliConsole;

/// Command-line overrides for a run
#[derive(Debug, Default)]
pub struct RunArgs {
    pub task_file: PathBuf,
    pub namespace: Option<String>,
    pub storage_root: Option<PathBuf>,
    pub deadline: Option<String>,
    pub template: Option<PathBuf>,
}

impl RunArgs {
    /// Fold the flags into `config` and re-validate
    pub fn apply_to(&self, config: &mut LunaConfig) -> Result<()> {
        if let Some(namespace) = &self.namespace {
            config.cluster.namespace = namespace.clone();
        }
        if let Some(root) = &self.storage_root {
            config.storage.root = root.clone();
        }
        if let Some(deadline) = &self.deadline {
            let parsed = humantime_serde::re::humantime::parse_duration(deadline)
                .with_context(|| format!("Invalid --deadline '{}'", deadline))?;
            config.polling.deadline = Some(parsed);
        }
        config.validate().context("Invalid configuration")?;
        Ok(())
    }
}

/// Run the task and return its result code
pub async fn execute(args: RunArgs, config: LunaConfig) -> Result<i32> {
    let console = CliConsole::new(true);
    let task = load_task(&args.task_file)?;
    let renderer = build_renderer(args.template.as_deref())?;

    let client = KubeClusterClient::try_default()
        .await
        .context("Failed to connect to the cluster")?;
    let storage_root = config.storage.resolved_root();
    let storage = LocalFsStorage::new(&storage_root);

    let cancel = CancellationToken::new();
    let executor = Executor::with_cancellation(
        Arc::new(client),
        Arc::new(storage),
        renderer,
        &config,
        cancel.clone(),
    );
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling evaluation");
            cancel.cancel();
        }
    });

    console.print_header(&format!("Task {}", task.id()));
    console.field("Pod", &format!("{}/{}", config.cluster.namespace, task.pod_name()));
    console.field("Stages", &task.stage_count().to_string());
    console.field("Storage", &storage_root.display().to_string());

    let result = executor.evaluate(&task).await;
    ctrl_c.abort();
    let code = result.with_context(|| format!("Task '{}' did not complete", task.id()))?;

    if code == 0 {
        console.success(&format!("Task {} succeeded", task.id()));
    } else {
        console.warn(&format!(
            "Task {} failed with exit code {}; pod {} was left for inspection",
            task.id(),
            code,
            task.pod_name()
        ));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flags_override_config() {
        let mut config = LunaConfig::default();
        let args = RunArgs {
            namespace: Some("eval".to_string()),
            storage_root: Some(PathBuf::from("/data")),
            deadline: Some("1h 30m".to_string()),
            ..Default::default()
        };
        args.apply_to(&mut config).unwrap();

        assert_eq!(config.cluster.namespace, "eval");
        assert_eq!(config.storage.root, PathBuf::from("/data"));
        assert_eq!(config.polling.deadline, Some(Duration::from_secs(5400)));
    }

    #[test]
    fn test_bad_deadline_is_rejected() {
        let mut config = LunaConfig::default();
        let args = RunArgs {
            deadline: Some("whenever".to_string()),
            ..Default::default()
        };
        assert!(args.apply_to(&mut config).is_err());
    }

    #[test]
    fn test_empty_namespace_fails_validation() {
        let mut config = LunaConfig::default();
        let args = RunArgs {
            namespace: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(args.apply_to(&mut config).is_err());
    }
}
