//! KubeClusterClient

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerState as K8sContainerState, Pod};
use ::kube::api::{Api, AttachParams, DeleteParams, DynamicObject, Patch, PatchParams};
use ::kube::core::GroupVersionKind;
use ::kube::discovery::{Discovery, Scope};
use ::kube::{Client, ResourceExt};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::exec::KubeExecChannel;
use crate::cluster::client::{
    AppliedObject, ClusterApplyClient, ClusterError, ClusterResult, ContainerState,
    ContainerStatus, PodStatus, ResourceKey,
};
use crate::cluster::exec::ExecChannel;
use crate::cluster::manifest::Manifest;

const DEFAULT_FIELD_MANAGER: &str = "luna";
const DEFAULT_EXEC_CLOSE_GRACE: Duration = Duration::from_secs(30);

/// Cluster client backed by the Kubernetes API
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
    exec_close_grace: Duration,
    discovery: OnceCell<Discovery>,
}

impl KubeClusterClient {
    /// Connect using the ambient kubeconfig or in-cluster service account
    pub async fn try_default() -> ClusterResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Connection(format!("Failed to create k8s client: {}", e)))?;
        Ok(Self::new(client))
    }

    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            exec_close_grace: DEFAULT_EXEC_CLOSE_GRACE,
            discovery: OnceCell::new(),
        }
    }

    /// Field manager name used for server-side apply
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// How long closing an exec channel waits for the remote command to finish
    pub fn with_exec_close_grace(mut self, grace: Duration) -> Self {
        self.exec_close_grace = grace;
        self
    }

    /// Namespace used for documents that do not name one
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }

    async fn discovery(&self) -> ClusterResult<&Discovery> {
        self.discovery
            .get_or_try_init(|| async {
                debug!("Running API discovery");
                Discovery::new(self.client.clone())
                    .run()
                    .await
                    .map_err(map_kube_error)
            })
            .await
    }

    /// Resolve the typed API endpoint for a generic document
    async fn dynamic_api(
        &self,
        manifest: &Manifest,
        fallback_namespace: &str,
    ) -> ClusterResult<(Api<DynamicObject>, DynamicObject, String)> {
        let invalid = |message: &str| ClusterError::InvalidManifest {
            resource: manifest.describe(),
            message: message.to_string(),
        };

        let api_version = manifest.api_version().ok_or_else(|| invalid("missing apiVersion"))?;
        let kind = manifest.kind().ok_or_else(|| invalid("missing kind"))?;
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);

        let (resource, capabilities) = self
            .discovery()
            .await?
            .resolve_gvk(&gvk)
            .ok_or_else(|| invalid("kind is not served by this cluster"))?;

        let object: DynamicObject = serde_json::from_value(manifest.doc().clone())
            .map_err(|e| invalid(&e.to_string()))?;

        let namespace = manifest
            .namespace()
            .unwrap_or(fallback_namespace)
            .to_string();
        let api = if matches!(capabilities.scope, Scope::Namespaced) {
            Api::namespaced_with(self.client.clone(), &namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };
        Ok((api, object, namespace))
    }
}

#[async_trait]
impl ClusterApplyClient for KubeClusterClient {
    #[instrument(skip(self, manifest), fields(resource = %manifest.describe()))]
    async fn create_or_update(&self, manifest: &Manifest) -> ClusterResult<AppliedObject> {
        let fallback = self.default_namespace().to_string();
        let (api, object, _) = self.dynamic_api(manifest, &fallback).await?;
        let name = object.name_any();
        if name.is_empty() {
            return Err(ClusterError::InvalidManifest {
                resource: manifest.describe(),
                message: "missing metadata.name".to_string(),
            });
        }

        let params = PatchParams::apply(&self.field_manager).force();
        let applied = api
            .patch(&name, &params, &Patch::Apply(&object))
            .await
            .map_err(map_kube_error)?;

        let key = ResourceKey::new(
            applied.namespace().unwrap_or_default(),
            manifest.kind().unwrap_or_default(),
            applied.name_any(),
        );
        let object = serde_json::to_value(&applied)
            .map_err(|e| ClusterError::api(None, format!("unreadable apply response: {}", e)))?;
        debug!(%key, "Applied resource");
        Ok(AppliedObject { key, object })
    }

    #[instrument(skip(self, manifest), fields(resource = %manifest.describe()))]
    async fn delete(&self, manifest: &Manifest, namespace: &str) -> ClusterResult<()> {
        let (api, object, _) = self.dynamic_api(manifest, namespace).await?;
        match api
            .delete(&object.name_any(), &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(::kube::Error::Api(response)) if response.code == 404 => {
                debug!("Resource already gone");
                Ok(())
            }
            Err(e) => Err(map_kube_error(e)),
        }
    }

    async fn pod_status(&self, namespace: &str, pod_name: &str) -> ClusterResult<PodStatus> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let Some(pod) = pods.get_opt(pod_name).await.map_err(map_kube_error)? else {
            return Ok(PodStatus::NotFound);
        };
        let Some(status) = pod.status else {
            return Ok(PodStatus::Pending);
        };

        let statuses: Vec<ContainerStatus> = status
            .init_container_statuses
            .into_iter()
            .flatten()
            .chain(status.container_statuses.into_iter().flatten())
            .map(|cs| ContainerStatus::new(cs.name, convert_state(cs.state)))
            .collect();

        if statuses.is_empty() {
            Ok(PodStatus::Pending)
        } else {
            Ok(PodStatus::Containers(statuses))
        }
    }

    #[instrument(skip(self, command))]
    async fn exec(
        &self,
        namespace: &str,
        pod_name: &str,
        container: &str,
        command: &[String],
    ) -> ClusterResult<Box<dyn ExecChannel>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(true)
            .stdout(true)
            .stderr(true);
        let process = pods
            .exec(pod_name, command.to_vec(), &params)
            .await
            .map_err(map_kube_error)?;
        Ok(Box::new(KubeExecChannel::spawn(
            process,
            self.exec_close_grace,
        )))
    }
}

fn convert_state(state: Option<K8sContainerState>) -> ContainerState {
    let Some(state) = state else {
        return ContainerState::Waiting { reason: None };
    };
    if let Some(terminated) = state.terminated {
        ContainerState::Terminated {
            exit_code: terminated.exit_code,
        }
    } else if state.running.is_some() {
        ContainerState::Running
    } else {
        ContainerState::Waiting {
            reason: state.waiting.and_then(|w| w.reason),
        }
    }
}

fn map_kube_error(err: ::kube::Error) -> ClusterError {
    match err {
        ::kube::Error::Api(response) => ClusterError::api(Some(response.code), response.message),
        other => ClusterError::api(None, other.to_string()),
    }
}
