//! Orchestration of one task run

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::lifecycle::PodLifecycleController;
use super::pod::{ContainerRole, PodHandle};
use super::state::ExecutorState;
use super::transfer::{FileTransferChannel, TransferSettings};
use super::waiter::{ContainerStateWaiter, PollPolicy};
use crate::cluster::ClusterApplyClient;
use crate::config::LunaConfig;
use crate::error::{LunaError, LunaResult};
use crate::render::{ClusterContext, ManifestRenderer};
use crate::storage::StorageBackend;
use crate::task::TaskSpec;

/// Drives a task through its pod: apply, copy in, run stages, copy out, remove
///
/// The returned code is `0` when every stage exited `0` and both transfers
/// completed. A non-zero stage exit is returned as-is and the pod is left in
/// place for inspection. Everything else is an error.
pub struct Executor {
    lifecycle: PodLifecycleController,
    waiter: ContainerStateWaiter,
    transfer: FileTransferChannel,
    cluster: ClusterContext,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        client: Arc<dyn ClusterApplyClient>,
        storage: Arc<dyn StorageBackend>,
        renderer: Arc<dyn ManifestRenderer>,
        config: &LunaConfig,
    ) -> Self {
        Self::with_cancellation(client, storage, renderer, config, CancellationToken::new())
    }

    /// Like [`Executor::new`], stopping at the next poll once `cancel` fires
    pub fn with_cancellation(
        client: Arc<dyn ClusterApplyClient>,
        storage: Arc<dyn StorageBackend>,
        renderer: Arc<dyn ManifestRenderer>,
        config: &LunaConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            lifecycle: PodLifecycleController::new(client.clone(), renderer),
            waiter: ContainerStateWaiter::new(
                client.clone(),
                PollPolicy::from(&config.polling),
                cancel.clone(),
            ),
            transfer: FileTransferChannel::new(
                client,
                storage,
                TransferSettings::new(&config.transfer, &config.polling),
                cancel.clone(),
            ),
            cluster: ClusterContext::from_config(config),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cluster_context(&self) -> &ClusterContext {
        &self.cluster
    }

    /// Run `task` to completion and return its result code
    #[instrument(skip_all, fields(task_id = task.id(), stages = task.stage_count()))]
    pub async fn evaluate(&self, task: &TaskSpec) -> LunaResult<i32> {
        let stages = task.stage_count();
        let mut state = ExecutorState::Start.next(stages);
        info!(%state, "Applying task manifests");

        let (pod, applied) = self.lifecycle.start(task, &self.cluster).await?;
        debug!(resources = applied.len(), "Batch applied");
        state = state.next(stages);

        loop {
            if self.cancel.is_cancelled() {
                return Err(LunaError::Cancelled);
            }
            info!(%state, %pod, "Executor state");

            state = match state {
                ExecutorState::WaitPreStageReady => {
                    self.wait_ready(&pod, ContainerRole::PreTask).await?;
                    state.next(stages)
                }
                ExecutorState::CopyIn => {
                    let container = ContainerRole::PreTask.container_name();
                    for spec in task.copy_in() {
                        self.transfer.copy_in(&pod, &container, spec).await?;
                    }
                    self.transfer.signal_completion(&pod, &container).await?;
                    state.next(stages)
                }
                ExecutorState::WaitStageExit(index) => {
                    let container = ContainerRole::Stage(index).container_name();
                    let exit_code = self.waiter.wait_until_exited(&pod, &container).await?;
                    if exit_code == 0 {
                        info!(stage = index, "Stage succeeded");
                        state.next(stages)
                    } else {
                        warn!(
                            stage = index,
                            exit_code,
                            %pod,
                            "Stage failed, leaving pod for inspection"
                        );
                        ExecutorState::Failed(exit_code)
                    }
                }
                ExecutorState::WaitPostStageReady => {
                    self.wait_ready(&pod, ContainerRole::PostTask).await?;
                    state.next(stages)
                }
                ExecutorState::CopyOut => {
                    let container = ContainerRole::PostTask.container_name();
                    for spec in task.copy_out() {
                        self.transfer.copy_out(&pod, &container, spec).await?;
                    }
                    self.transfer.signal_completion(&pod, &container).await?;
                    state.next(stages)
                }
                ExecutorState::Remove => {
                    self.lifecycle.remove(&pod).await?;
                    state.next(stages)
                }
                ExecutorState::Done => {
                    info!("Task completed");
                    return Ok(0);
                }
                ExecutorState::Failed(exit_code) => return Ok(exit_code),
                ExecutorState::Start | ExecutorState::Applying => state.next(stages),
            };
        }
    }

    async fn wait_ready(&self, pod: &PodHandle, role: ContainerRole) -> LunaResult<()> {
        self.waiter
            .wait_until_ready(pod, &role.container_name())
            .await
    }
}
