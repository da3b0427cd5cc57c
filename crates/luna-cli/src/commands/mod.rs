//! CLI commands

pub mod config;
pub mod render;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use luna_core::{ManifestRenderer, TaskSpec, TeraManifestRenderer};

/// Read a task file; `.json` is parsed as JSON, anything else as YAML
pub fn load_task(path: &Path) -> Result<TaskSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let task = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid task file {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid task file {}", path.display()))?
    };
    Ok(task)
}

/// The built-in pod template, or the one at `template`
pub fn build_renderer(template: Option<&Path>) -> Result<Arc<dyn ManifestRenderer>> {
    let renderer = match template {
        Some(path) => TeraManifestRenderer::from_file(path)
            .with_context(|| format!("Failed to load template {}", path.display()))?,
        None => TeraManifestRenderer::new().context("Failed to load built-in template")?,
    };
    Ok(Arc::new(renderer))
}
