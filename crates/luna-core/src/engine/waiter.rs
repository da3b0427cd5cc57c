//! Container lifecycle polling

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::pod::PodHandle;
use crate::cluster::{ClusterApplyClient, ClusterError, ContainerState};
use crate::config::PollingConfig;
use crate::error::{LunaError, LunaResult};

/// Timing of container state polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Used while the pod, its status or the container is not visible
    pub pending_interval: Duration,
    /// Used while the container is visible but not in the target state
    pub poll_interval: Duration,
    /// Give up after this long; wait forever when `None`
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            pending_interval: config.pending_interval,
            poll_interval: config.poll_interval,
            deadline: config.deadline,
        }
    }
}

impl PollPolicy {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

enum Check<T> {
    Done(LunaResult<T>),
    NotYet,
}

/// Polls a named container until it is running or has exited
pub struct ContainerStateWaiter {
    client: Arc<dyn ClusterApplyClient>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl ContainerStateWaiter {
    pub fn new(
        client: Arc<dyn ClusterApplyClient>,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Return once `container` reports Running
    ///
    /// A container that terminates first can never become ready and is
    /// reported as [`ClusterError::UnexpectedState`].
    pub async fn wait_until_ready(&self, pod: &PodHandle, container: &str) -> LunaResult<()> {
        self.wait_for(pod, container, "become ready", |state| match state {
            ContainerState::Running => Check::Done(Ok(())),
            ContainerState::Terminated { exit_code } => Check::Done(Err(
                ClusterError::UnexpectedState {
                    pod: pod.name.clone(),
                    container: container.to_string(),
                    message: format!("terminated with exit code {} before becoming ready", exit_code),
                }
                .into(),
            )),
            ContainerState::Waiting { .. } => Check::NotYet,
        })
        .await
    }

    /// Return the exit code once `container` reports Terminated
    pub async fn wait_until_exited(&self, pod: &PodHandle, container: &str) -> LunaResult<i32> {
        self.wait_for(pod, container, "exit", |state| match state {
            ContainerState::Terminated { exit_code } => Check::Done(Ok(*exit_code)),
            _ => Check::NotYet,
        })
        .await
    }

    async fn wait_for<T, F>(
        &self,
        pod: &PodHandle,
        container: &str,
        condition: &str,
        check: F,
    ) -> LunaResult<T>
    where
        F: Fn(&ContainerState) -> Check<T>,
    {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(LunaError::Cancelled);
            }

            let status = self.client.pod_status(&pod.namespace, &pod.name).await?;
            let interval = match status.container(container) {
                None => {
                    trace!(%pod, container, "Container not visible yet");
                    self.policy.pending_interval
                }
                Some(observed) => match check(&observed.state) {
                    Check::Done(result) => {
                        debug!(
                            %pod,
                            container,
                            condition,
                            waited = ?started.elapsed(),
                            "Container reached awaited state"
                        );
                        return result;
                    }
                    Check::NotYet => {
                        trace!(%pod, container, state = ?observed.state, "Waiting");
                        self.policy.poll_interval
                    }
                },
            };

            let sleep_for = match self.policy.deadline {
                Some(deadline) => {
                    let waited = started.elapsed();
                    if waited >= deadline {
                        return Err(LunaError::Timeout {
                            pod: pod.name.clone(),
                            container: container.to_string(),
                            condition: condition.to_string(),
                            waited,
                        });
                    }
                    interval.min(deadline - waited)
                }
                None => interval,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(LunaError::Cancelled),
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ContainerStatus, MockClusterApplyClient, PodStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pod() -> PodHandle {
        PodHandle::new("default", "luna-t1")
    }

    /// Mock whose pod status walks through `statuses`, repeating the last one
    fn scripted(statuses: Vec<PodStatus>) -> (Arc<dyn ClusterApplyClient>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockClusterApplyClient::new();
        mock.expect_pod_status().returning(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(statuses[n.min(statuses.len() - 1)].clone())
        });
        (Arc::new(mock), calls)
    }

    fn containers(name: &str, state: ContainerState) -> PodStatus {
        PodStatus::Containers(vec![ContainerStatus::new(name, state)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_transient_states() {
        let (client, calls) = scripted(vec![
            PodStatus::NotFound,
            PodStatus::Pending,
            containers("other", ContainerState::Running),
            containers("pre-task", ContainerState::Waiting { reason: None }),
            containers("pre-task", ContainerState::Running),
        ]);
        let waiter = ContainerStateWaiter::new(client, PollPolicy::default(), CancellationToken::new());

        let start = Instant::now();
        waiter.wait_until_ready(&pod(), "pre-task").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // three pending polls at 1s, one waiting poll at 2s
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_code_is_returned() {
        let (client, _) = scripted(vec![
            containers("task-1", ContainerState::Running),
            containers("task-1", ContainerState::Terminated { exit_code: 3 }),
        ]);
        let waiter = ContainerStateWaiter::new(client, PollPolicy::default(), CancellationToken::new());

        let code = waiter.wait_until_exited(&pod(), "task-1").await.unwrap();
        assert_eq!(code, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_while_waiting_for_ready() {
        let (client, _) = scripted(vec![containers(
            "post-task",
            ContainerState::Terminated { exit_code: 0 },
        )]);
        let waiter = ContainerStateWaiter::new(client, PollPolicy::default(), CancellationToken::new());

        let err = waiter.wait_until_ready(&pod(), "post-task").await.unwrap_err();
        assert!(matches!(
            err,
            LunaError::Cluster(ClusterError::UnexpectedState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_raises_timeout() {
        let (client, _) = scripted(vec![containers("task-1", ContainerState::Running)]);
        let policy = PollPolicy::default().with_deadline(Duration::from_secs(7));
        let waiter = ContainerStateWaiter::new(client, policy, CancellationToken::new());

        let start = Instant::now();
        let err = waiter.wait_until_exited(&pod(), "task-1").await.unwrap_err();
        match err {
            LunaError::Timeout {
                container, waited, ..
            } => {
                assert_eq!(container, "task-1");
                assert_eq!(waited, Duration::from_secs(7));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let (client, _) = scripted(vec![PodStatus::Pending]);
        let cancel = CancellationToken::new();
        let waiter = ContainerStateWaiter::new(client, PollPolicy::default(), cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });

        let err = waiter.wait_until_ready(&pod(), "pre-task").await.unwrap_err();
        assert!(matches!(err, LunaError::Cancelled));
        trigger.await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_pod_status()
            .times(1)
            .returning(|_, _| Err(ClusterError::api(Some(403), "forbidden")));
        let waiter = ContainerStateWaiter::new(
            Arc::new(mock),
            PollPolicy::default(),
            CancellationToken::new(),
        );

        let err = waiter.wait_until_ready(&pod(), "pre-task").await.unwrap_err();
        assert_eq!(err.error_code(), "LUNA_CLUSTER");
    }
}
