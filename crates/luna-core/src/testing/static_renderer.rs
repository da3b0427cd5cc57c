use crate::cluster::Manifest;
use crate::error::{LunaError, LunaResult};
use crate::render::{ClusterContext, ManifestRenderer};
use crate::task::TaskSpec;

/// Renderer returning a fixed document set, or a fixed error
pub struct StaticRenderer {
    result: Result<Vec<Manifest>, String>,
}

impl StaticRenderer {
    pub fn new(manifests: Vec<Manifest>) -> Self {
        Self {
            result: Ok(manifests),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
        }
    }
}

impl ManifestRenderer for StaticRenderer {
    fn render(&self, _task: &TaskSpec, _cluster: &ClusterContext) -> LunaResult<Vec<Manifest>> {
        self.result.clone().map_err(LunaError::render)
    }
}
