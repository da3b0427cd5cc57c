//! TaskSpec and its construction contract

use serde::{Deserialize, Serialize};

use crate::error::{LunaError, LunaResult};

/// Prefix of every pod name; `luna-<id>` must stay a valid DNS-1123 label.
const POD_NAME_PREFIX: &str = "luna-";
const MAX_LABEL_LEN: usize = 63;

/// Directory copied from storage into a container before the first stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyIn {
    /// Prefix in the storage backend, relative to its root
    pub storage_prefix: String,
    /// Absolute directory inside the container
    pub container_path: String,
}

impl CopyIn {
    pub fn new(storage_prefix: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            storage_prefix: storage_prefix.into(),
            container_path: container_path.into(),
        }
    }
}

/// Directory copied from a container back to storage after the last stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOut {
    /// Absolute directory inside the container
    pub container_path: String,
    /// Destination prefix in the storage backend
    pub storage_prefix: String,
}

impl CopyOut {
    pub fn new(container_path: impl Into<String>, storage_prefix: impl Into<String>) -> Self {
        Self {
            container_path: container_path.into(),
            storage_prefix: storage_prefix.into(),
        }
    }
}

/// Wire shape of a task file, validated into a [`TaskSpec`]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskSpec {
    id: String,
    stage_images: Vec<String>,
    stage_commands: Vec<Vec<String>>,
    #[serde(default)]
    copy_in: Vec<CopyIn>,
    #[serde(default)]
    copy_out: Vec<CopyOut>,
}

/// Immutable description of one evaluation run
///
/// Construction enforces `stage_images.len() == stage_commands.len() >= 1`
/// and a pod-name-safe id, so a `TaskSpec` that exists is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTaskSpec")]
pub struct TaskSpec {
    id: String,
    stage_images: Vec<String>,
    stage_commands: Vec<Vec<String>>,
    copy_in: Vec<CopyIn>,
    copy_out: Vec<CopyOut>,
}

impl TryFrom<RawTaskSpec> for TaskSpec {
    type Error = LunaError;

    fn try_from(raw: RawTaskSpec) -> LunaResult<Self> {
        TaskSpec::new(raw.id, raw.stage_images, raw.stage_commands)?
            .with_copy_in(raw.copy_in)
            .with_copy_out(raw.copy_out)
            .validated()
    }
}

impl TaskSpec {
    /// Create a task with the given stages and no file transfers
    pub fn new(
        id: impl Into<String>,
        stage_images: Vec<String>,
        stage_commands: Vec<Vec<String>>,
    ) -> LunaResult<Self> {
        let spec = Self {
            id: id.into(),
            stage_images,
            stage_commands,
            copy_in: Vec::new(),
            copy_out: Vec::new(),
        };
        spec.validated()
    }

    /// Set the directories copied into the pre-stage container
    pub fn with_copy_in(mut self, copy_in: Vec<CopyIn>) -> Self {
        self.copy_in = copy_in;
        self
    }

    /// Set the directories copied out of the post-stage container
    pub fn with_copy_out(mut self, copy_out: Vec<CopyOut>) -> Self {
        self.copy_out = copy_out;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage_images(&self) -> &[String] {
        &self.stage_images
    }

    pub fn stage_commands(&self) -> &[Vec<String>] {
        &self.stage_commands
    }

    pub fn copy_in(&self) -> &[CopyIn] {
        &self.copy_in
    }

    pub fn copy_out(&self) -> &[CopyOut] {
        &self.copy_out
    }

    /// Number of compute stages
    pub fn stage_count(&self) -> usize {
        self.stage_images.len()
    }

    /// Deterministic pod name for this task
    pub fn pod_name(&self) -> String {
        format!("{}{}", POD_NAME_PREFIX, self.id)
    }

    /// Iterate `(image, command)` pairs in stage order
    pub fn stages(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.stage_images
            .iter()
            .map(String::as_str)
            .zip(self.stage_commands.iter().map(Vec::as_slice))
    }

    fn validated(self) -> LunaResult<Self> {
        validate_id(&self.id)?;

        if self.stage_images.is_empty() {
            return Err(LunaError::invalid_task_field(
                "a task needs at least one stage",
                "stageImages",
            ));
        }
        if self.stage_images.len() != self.stage_commands.len() {
            return Err(LunaError::invalid_task_field(
                format!(
                    "{} stage image(s) but {} stage command(s)",
                    self.stage_images.len(),
                    self.stage_commands.len()
                ),
                "stageCommands",
            ));
        }
        if let Some(pos) = self.stage_images.iter().position(|i| i.trim().is_empty()) {
            return Err(LunaError::invalid_task_field(
                format!("stage {} has an empty image reference", pos + 1),
                "stageImages",
            ));
        }
        if let Some(pos) = self.stage_commands.iter().position(Vec::is_empty) {
            return Err(LunaError::invalid_task_field(
                format!("stage {} has an empty command", pos + 1),
                "stageCommands",
            ));
        }
        for copy in &self.copy_in {
            validate_container_path(&copy.container_path, "copyIn")?;
        }
        for copy in &self.copy_out {
            validate_container_path(&copy.container_path, "copyOut")?;
        }

        Ok(self)
    }
}

fn validate_id(id: &str) -> LunaResult<()> {
    if id.is_empty() {
        return Err(LunaError::invalid_task_field("task id must not be empty", "id"));
    }
    if POD_NAME_PREFIX.len() + id.len() > MAX_LABEL_LEN {
        return Err(LunaError::invalid_task_field(
            format!(
                "task id '{}' is too long, at most {} characters are allowed",
                id,
                MAX_LABEL_LEN - POD_NAME_PREFIX.len()
            ),
            "id",
        ));
    }
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || id.ends_with('-') {
        return Err(LunaError::invalid_task_field(
            format!(
                "task id '{}' must consist of lowercase letters, digits and '-' and must not end with '-'",
                id
            ),
            "id",
        ));
    }
    Ok(())
}

fn validate_container_path(path: &str, field: &str) -> LunaResult<()> {
    if !path.starts_with('/') {
        return Err(LunaError::invalid_task_field(
            format!("container path '{}' must be absolute", path),
            field,
        ));
    }
    Ok(())
}
