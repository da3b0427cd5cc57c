//! CLI argument definitions using clap
//!
//! - luna run <task-file>       # Evaluate a task on the cluster
//! - luna render <task-file>    # Print the manifests a run would apply
//! - luna config show|init      # Inspect or create configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "luna")]
#[command(about = "Luna - run model evaluation pipelines as ephemeral pods")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (defaults to ./luna.toml, then ~/.luna/config.toml)
    #[arg(long, global = true, env = "LUNA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a task and exit with its result code
    Run {
        /// Task file (YAML or JSON)
        task_file: PathBuf,

        /// Namespace the task pod is created in
        #[arg(long)]
        namespace: Option<String>,

        /// Root directory of the local storage backend
        #[arg(long)]
        storage_root: Option<PathBuf>,

        /// Give up on any single container wait after this long (e.g. "30m")
        #[arg(long)]
        deadline: Option<String>,

        /// Pod template to render instead of the built-in one
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Render a task's manifests without touching the cluster
    Render {
        /// Task file (YAML or JSON)
        task_file: PathBuf,

        /// Pod template to render instead of the built-in one
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Create a new configuration file with defaults
    Init {
        /// Path for the new configuration file
        #[arg(long, default_value = luna_core::config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "luna",
            "run",
            "task.yaml",
            "--namespace",
            "eval",
            "--deadline",
            "45m",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Run {
                task_file,
                namespace,
                deadline,
                storage_root,
                template,
            } => {
                assert_eq!(task_file, PathBuf::from("task.yaml"));
                assert_eq!(namespace.as_deref(), Some("eval"));
                assert_eq!(deadline.as_deref(), Some("45m"));
                assert!(storage_root.is_none());
                assert!(template.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_init_defaults() {
        let cli = Cli::try_parse_from(["luna", "config", "init"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { path, force },
            } => {
                assert_eq!(path, PathBuf::from("luna.toml"));
                assert!(!force);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_task_file() {
        assert!(Cli::try_parse_from(["luna", "run"]).is_err());
    }
}
