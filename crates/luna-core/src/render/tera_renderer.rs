//! Template renderer using Tera for Jinja2-style pod templates

use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use super::{ClusterContext, ManifestRenderer};
use crate::cluster::Manifest;
use crate::engine::ContainerRole;
use crate::error::{LunaError, LunaResult};
use crate::task::TaskSpec;

/// Name under which the built-in template is registered
pub const DEFAULT_TEMPLATE_NAME: &str = "task-pod.yaml.j2";

const DEFAULT_TEMPLATE: &str = include_str!("templates/task-pod.yaml.j2");

#[derive(Serialize)]
struct StageView<'a> {
    name: String,
    image: &'a str,
    command: &'a [String],
}

#[derive(Serialize)]
struct EnvVarView<'a> {
    name: &'a str,
    value: &'a str,
}

/// [`ManifestRenderer`] backed by a Tera template producing multi-document YAML
#[derive(Debug)]
pub struct TeraManifestRenderer {
    tera: Tera,
    template_name: String,
}

impl TeraManifestRenderer {
    /// Renderer using the built-in single-pod template
    pub fn new() -> LunaResult<Self> {
        Self::from_template(DEFAULT_TEMPLATE_NAME, DEFAULT_TEMPLATE)
    }

    /// Renderer using a caller-supplied template source
    pub fn from_template(name: &str, source: &str) -> LunaResult<Self> {
        let mut tera = Tera::default();
        // manifests are YAML whatever the file suffix
        tera.autoescape_on(vec![]);
        tera.add_raw_template(name, source)?;
        debug!(template = name, "Loaded manifest template");
        Ok(Self {
            tera,
            template_name: name.to_string(),
        })
    }

    /// Renderer using a template file from disk
    pub fn from_file(path: &Path) -> LunaResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            LunaError::render(format!(
                "Failed to read template '{}': {}",
                path.display(),
                e
            ))
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_TEMPLATE_NAME);
        Self::from_template(name, &source)
    }

    fn context(task: &TaskSpec, cluster: &ClusterContext) -> Context {
        let marker = shell_words::quote(&cluster.completion_marker).into_owned();
        let wait_script = format!("until [ -f {marker} ]; do sleep 1; done");
        let pre_task_script = format!("{} && {}", cluster.setup_command, wait_script);

        let stages: Vec<StageView<'_>> = task
            .stages()
            .enumerate()
            .map(|(i, (image, command))| StageView {
                name: ContainerRole::Stage(i + 1).container_name(),
                image,
                command,
            })
            .collect();
        let env: Vec<EnvVarView<'_>> = cluster
            .env
            .iter()
            .map(|(name, value)| EnvVarView { name, value })
            .collect();

        let mut context = Context::new();
        context.insert("task_id", task.id());
        context.insert("pod_name", &task.pod_name());
        context.insert("namespace", &cluster.namespace);
        context.insert("workspace_mount", &cluster.workspace_mount);
        context.insert("setup_command", &cluster.setup_command);
        context.insert("helper_image", &cluster.helper_image);
        context.insert("completion_marker", &cluster.completion_marker);
        context.insert("pre_task", &ContainerRole::PreTask.container_name());
        context.insert("post_task", &ContainerRole::PostTask.container_name());
        context.insert("pre_task_script", &pre_task_script);
        context.insert("wait_script", &wait_script);
        context.insert("stages", &stages);
        context.insert("env", &env);
        context
    }
}

impl ManifestRenderer for TeraManifestRenderer {
    fn render(&self, task: &TaskSpec, cluster: &ClusterContext) -> LunaResult<Vec<Manifest>> {
        let context = Self::context(task, cluster);
        let rendered = self.tera.render(&self.template_name, &context)?;
        let manifests = Manifest::parse_yaml_stream(&rendered)?;
        if manifests.is_empty() {
            return Err(LunaError::render(format!(
                "template '{}' produced no documents",
                self.template_name
            )));
        }
        debug!(
            task_id = task.id(),
            documents = manifests.len(),
            "Rendered manifests"
        );
        Ok(manifests)
    }
}
