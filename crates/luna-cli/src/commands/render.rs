//! `luna render`: print the manifests of a task as YAML

use std::path::Path;

use anyhow::{Context, Result};
use luna_core::{ClusterContext, LunaConfig, Manifest, ManifestRenderer};

use super::{build_renderer, load_task};

/// Render `task_file` with the effective config and print the documents
pub fn execute(task_file: &Path, template: Option<&Path>, config: &LunaConfig) -> Result<()> {
    let task = load_task(task_file)?;
    let renderer = build_renderer(template)?;
    let manifests = renderer
        .render(&task, &ClusterContext::from_config(config))
        .with_context(|| format!("Failed to render task '{}'", task.id()))?;
    print!("{}", to_yaml_stream(&manifests)?);
    Ok(())
}

/// Documents joined into one `---` separated stream
pub fn to_yaml_stream(manifests: &[Manifest]) -> Result<String> {
    let mut out = String::new();
    for manifest in manifests {
        out.push_str("---\n");
        out.push_str(
            &serde_yaml::to_string(manifest.doc()).context("Failed to serialize manifest")?,
        );
    }
    Ok(out)
}
