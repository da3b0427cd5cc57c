//! Configuration management commands

use std::path::Path;

use anyhow::{Context, Result, bail};
use luna_core::LunaConfig;

use crate::console::CliConsole;

/// Show the effective configuration
pub fn show(config: &LunaConfig, source: Option<&Path>) -> Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration");
    match source {
        Some(path) if path.exists() => console.info(&format!("Loaded from {}", path.display())),
        Some(path) => console.warn(&format!(
            "Configuration file not found: {}, using defaults",
            path.display()
        )),
        None => console.info("Using discovered configuration and environment overrides"),
    }

    console.field("Namespace", &config.cluster.namespace);
    console.field("Helper image", &config.cluster.helper_image);
    console.field("Workspace", &config.cluster.workspace_mount);
    console.field(
        "Storage root",
        &config.storage.resolved_root().display().to_string(),
    );
    let deadline = config
        .polling
        .deadline
        .map(|d| humantime_serde::re::humantime::format_duration(d).to_string())
        .unwrap_or_else(|| "none".to_string());
    console.field("Wait deadline", &deadline);
    console.field("Log level", &config.logging.level);
    console.field("Log format", &config.logging.format);

    println!();
    print!("{}", render_toml(config)?);
    Ok(())
}

/// Write a configuration file with every default spelled out
pub fn init(path: &Path, force: bool) -> Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Initialization");

    if path.exists() && !force {
        console.info("Use --force to overwrite");
        bail!("Configuration file already exists: {}", path.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, render_toml(&LunaConfig::default())?)
        .with_context(|| format!("Failed to write configuration file {}", path.display()))?;

    console.success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}

fn render_toml(config: &LunaConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}
