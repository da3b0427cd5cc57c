//! Pod identity and per-run bookkeeping

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::cluster::{AppliedObject, Manifest, ResourceKey};
use crate::task::TaskSpec;

/// Role of a container inside a task pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerRole {
    /// Receives copy-in data before the first stage
    PreTask,
    /// Compute stage, numbered from 1
    Stage(usize),
    /// Holds the results for copy-out after the last stage
    PostTask,
}

impl ContainerRole {
    pub fn container_name(&self) -> String {
        match self {
            Self::PreTask => "pre-task".to_string(),
            Self::Stage(index) => format!("task-{}", index),
            Self::PostTask => "post-task".to_string(),
        }
    }

    /// All roles of a pod with `stages` compute stages, in execution order
    pub fn sequence(stages: usize) -> Vec<ContainerRole> {
        std::iter::once(Self::PreTask)
            .chain((1..=stages).map(Self::Stage))
            .chain(std::iter::once(Self::PostTask))
            .collect()
    }
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.container_name())
    }
}

/// The pod created for one `evaluate` call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodHandle {
    pub namespace: String,
    pub name: String,
}

impl PodHandle {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn for_task(task: &TaskSpec, namespace: impl Into<String>) -> Self {
        Self::new(namespace, task.pod_name())
    }

    /// Document that identifies this pod for deletion
    pub fn reference_manifest(&self) -> Manifest {
        Manifest::pod_reference(&self.namespace, &self.name)
    }
}

impl fmt::Display for PodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One document that made it into the cluster
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedResource {
    /// Position in the rendered batch
    pub index: usize,
    pub manifest: Manifest,
    /// Object as returned by the server
    pub object: Value,
}

/// Resources applied by one batch, kept for rollback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestApplyResult {
    applied: BTreeMap<ResourceKey, AppliedResource>,
}

impl ManifestApplyResult {
    pub fn record(&mut self, index: usize, manifest: Manifest, applied: AppliedObject) {
        self.applied.insert(
            applied.key,
            AppliedResource {
                index,
                manifest,
                object: applied.object,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&AppliedResource> {
        self.applied.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.applied.keys()
    }

    /// Applied resources, last applied first
    pub fn in_rollback_order(&self) -> Vec<(&ResourceKey, &AppliedResource)> {
        let mut entries: Vec<_> = self.applied.iter().collect();
        entries.sort_by(|a, b| b.1.index.cmp(&a.1.index));
        entries
    }
}
