//! Pod creation as one transactional batch, and teardown

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::pod::{ManifestApplyResult, PodHandle};
use crate::cluster::ClusterApplyClient;
use crate::error::{ApplyFailure, LunaError, LunaResult};
use crate::render::{ClusterContext, ManifestRenderer};
use crate::task::TaskSpec;

/// Applies a task's manifests and tears its pod down again
pub struct PodLifecycleController {
    client: Arc<dyn ClusterApplyClient>,
    renderer: Arc<dyn ManifestRenderer>,
}

impl PodLifecycleController {
    pub fn new(client: Arc<dyn ClusterApplyClient>, renderer: Arc<dyn ManifestRenderer>) -> Self {
        Self { client, renderer }
    }

    /// Render and apply every document of the task's batch
    ///
    /// Every document gets an apply attempt. When any of them fails, the ones
    /// that did apply are deleted again and a [`LunaError::ManifestApply`]
    /// lists all failures, including deletes that failed during rollback.
    #[instrument(skip_all, fields(task_id = task.id()))]
    pub async fn start(
        &self,
        task: &TaskSpec,
        cluster: &ClusterContext,
    ) -> LunaResult<(PodHandle, ManifestApplyResult)> {
        let manifests = self.renderer.render(task, cluster)?;

        let mut applied = ManifestApplyResult::default();
        let mut failures = Vec::new();
        for (index, manifest) in manifests.into_iter().enumerate() {
            match self.client.create_or_update(&manifest).await {
                Ok(object) => {
                    info!(resource = %object.key, "Applied manifest");
                    applied.record(index, manifest, object);
                }
                Err(e) => {
                    warn!(resource = %manifest.describe(), error = %e, "Failed to apply manifest");
                    failures.push(ApplyFailure {
                        index,
                        resource: Some(manifest.describe()),
                        message: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            let rollback_failures = self.rollback(&applied, &cluster.namespace).await;
            return Err(LunaError::ManifestApply {
                failures,
                rollback_failures,
            });
        }

        let pod = PodHandle::for_task(task, cluster.namespace.clone());
        info!(%pod, resources = applied.len(), "Pod manifests applied");
        Ok((pod, applied))
    }

    /// Delete whatever a failed batch created, newest first
    async fn rollback(&self, applied: &ManifestApplyResult, namespace: &str) -> Vec<ApplyFailure> {
        let mut failures = Vec::new();
        for (key, resource) in applied.in_rollback_order() {
            let target_namespace = if key.namespace.is_empty() {
                namespace
            } else {
                key.namespace.as_str()
            };
            match self.client.delete(&resource.manifest, target_namespace).await {
                Ok(()) => info!(resource = %key, "Rolled back manifest"),
                Err(e) => {
                    error!(resource = %key, error = %e, "Rollback delete failed");
                    failures.push(ApplyFailure::for_key(resource.index, key, e.to_string()));
                }
            }
        }
        failures
    }

    /// Delete the pod with background propagation
    ///
    /// Returns once the delete is accepted; the pod may still be terminating.
    #[instrument(skip(self), fields(pod = %pod))]
    pub async fn remove(&self, pod: &PodHandle) -> LunaResult<()> {
        self.client
            .delete(&pod.reference_manifest(), &pod.namespace)
            .await?;
        info!("Pod deletion accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{AppliedObject, ClusterError, Manifest, MockClusterApplyClient, ResourceKey};
    use crate::config::LunaConfig;
    use crate::testing::StaticRenderer;
    use mockall::predicate::*;
    use serde_json::json;

    fn task() -> TaskSpec {
        TaskSpec::new("t1", vec!["img".to_string()], vec![vec!["true".to_string()]]).unwrap()
    }

    fn context() -> ClusterContext {
        ClusterContext::from_config(&LunaConfig::default())
    }

    fn doc(kind: &str, name: &str) -> Manifest {
        Manifest::new(json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"name": name, "namespace": "default"},
        }))
    }

    fn applied(manifest: &Manifest) -> AppliedObject {
        AppliedObject {
            key: ResourceKey::new(
                "default",
                manifest.kind().unwrap_or_default(),
                manifest.name().unwrap_or_default(),
            ),
            object: manifest.doc().clone(),
        }
    }

    fn controller(mock: MockClusterApplyClient, docs: Vec<Manifest>) -> PodLifecycleController {
        PodLifecycleController::new(Arc::new(mock), Arc::new(StaticRenderer::new(docs)))
    }

    #[tokio::test]
    async fn test_start_applies_every_document() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_create_or_update()
            .times(2)
            .returning(|m| Ok(applied(m)));
        mock.expect_delete().never();

        let controller = controller(mock, vec![doc("ConfigMap", "cfg"), doc("Pod", "luna-t1")]);
        let (pod, result) = controller.start(&task(), &context()).await.unwrap();

        assert_eq!(pod, PodHandle::new("default", "luna-t1"));
        assert_eq!(result.len(), 2);
        assert!(result
            .get(&ResourceKey::new("default", "Pod", "luna-t1"))
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_document_rolls_back_the_batch() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_create_or_update()
            .withf(|m| m.name() == Some("cfg"))
            .returning(|m| Ok(applied(m)));
        mock.expect_create_or_update()
            .withf(|m| m.name() == Some("luna-t1"))
            .returning(|_| Err(ClusterError::api(Some(422), "spec.containers: Required value")));
        mock.expect_delete()
            .withf(|m, ns| m.name() == Some("cfg") && ns == "default")
            .times(1)
            .returning(|_, _| Ok(()));

        let controller = controller(mock, vec![doc("ConfigMap", "cfg"), doc("Pod", "luna-t1")]);
        let err = controller.start(&task(), &context()).await.unwrap_err();

        match err {
            LunaError::ManifestApply {
                failures,
                rollback_failures,
            } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].index, 1);
                assert_eq!(failures[0].resource.as_deref(), Some("Pod/luna-t1"));
                assert!(rollback_failures.is_empty());
            }
            other => panic!("expected ManifestApply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_document_is_attempted() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_create_or_update()
            .times(3)
            .returning(|m| {
                if m.name() == Some("b") {
                    Ok(applied(m))
                } else {
                    Err(ClusterError::api(Some(409), "conflict"))
                }
            });
        mock.expect_delete().times(1).returning(|_, _| Ok(()));

        let controller = controller(
            mock,
            vec![doc("ConfigMap", "a"), doc("ConfigMap", "b"), doc("Pod", "c")],
        );
        let err = controller.start(&task(), &context()).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to apply 2 manifest document(s)"));
    }

    #[tokio::test]
    async fn test_rollback_failures_are_reported() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_create_or_update()
            .withf(|m| m.name() == Some("cfg"))
            .returning(|m| Ok(applied(m)));
        mock.expect_create_or_update()
            .withf(|m| m.name() == Some("luna-t1"))
            .returning(|_| Err(ClusterError::api(Some(500), "boom")));
        mock.expect_delete()
            .returning(|_, _| Err(ClusterError::api(Some(503), "unavailable")));

        let controller = controller(mock, vec![doc("ConfigMap", "cfg"), doc("Pod", "luna-t1")]);
        let err = controller.start(&task(), &context()).await.unwrap_err();

        let LunaError::ManifestApply {
            rollback_failures, ..
        } = err
        else {
            panic!("expected ManifestApply");
        };
        assert_eq!(rollback_failures.len(), 1);
        assert_eq!(rollback_failures[0].resource.as_deref(), Some("ConfigMap/cfg"));
    }

    #[tokio::test]
    async fn test_render_error_makes_no_cluster_calls() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_create_or_update().never();
        let controller = PodLifecycleController::new(
            Arc::new(mock),
            Arc::new(StaticRenderer::failing("template exploded")),
        );

        let err = controller.start(&task(), &context()).await.unwrap_err();
        assert_eq!(err.error_code(), "LUNA_RENDER");
    }

    #[tokio::test]
    async fn test_remove_deletes_pod_reference() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_delete()
            .with(
                eq(Manifest::pod_reference("eval", "luna-t1")),
                eq("eval"),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let controller = controller(mock, Vec::new());
        controller
            .remove(&PodHandle::new("eval", "luna-t1"))
            .await
            .unwrap();
    }
}
