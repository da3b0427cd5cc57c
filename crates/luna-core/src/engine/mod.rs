//! Task execution engine
//!
//! [`Executor::evaluate`] sequences the pieces:
//! - [`PodLifecycleController`] applies the rendered manifests as one batch
//!   and removes the pod at the end
//! - [`ContainerStateWaiter`] gates every stage transition on the container
//!   states the cluster reports
//! - [`FileTransferChannel`] moves files in before the first stage and out
//!   after the last one

mod executor;
pub mod framing;
mod lifecycle;
mod pod;
mod state;
mod transfer;
mod waiter;

pub use executor::Executor;
pub use lifecycle::PodLifecycleController;
pub use pod::{AppliedResource, ContainerRole, ManifestApplyResult, PodHandle};
pub use state::ExecutorState;
pub use transfer::{FileTransferChannel, TransferSettings};
pub use waiter::{ContainerStateWaiter, PollPolicy};
