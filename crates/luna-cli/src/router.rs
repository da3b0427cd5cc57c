//! Command routing logic for CLI

use anyhow::{Context, Result};
use luna_core::config::load_config;

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands::{self, run::RunArgs};
use crate::logging;

/// Route CLI commands to their handlers and return the process exit code
pub async fn route(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            task_file,
            namespace,
            storage_root,
            deadline,
            template,
        } => {
            let args = RunArgs {
                task_file,
                namespace,
                storage_root,
                deadline,
                template,
            };
            let mut config = load_config(config_path).context("Failed to load configuration")?;
            args.apply_to(&mut config)?;
            logging::init(&config.logging)?;
            commands::run::execute(args, config).await
        }
        Commands::Render {
            task_file,
            template,
        } => {
            let config = load_config(config_path).context("Failed to load configuration")?;
            logging::init(&config.logging)?;
            commands::render::execute(&task_file, template.as_deref(), &config)?;
            Ok(0)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => {
                    let config =
                        load_config(config_path).context("Failed to load configuration")?;
                    commands::config::show(&config, config_path)?;
                }
                ConfigAction::Init { path, force } => commands::config::init(&path, force)?,
            }
            Ok(0)
        }
    }
}
