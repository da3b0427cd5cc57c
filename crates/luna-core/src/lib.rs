//! Luna Core Library
//!
//! Task execution engine for Luna model evaluations. A [`TaskSpec`] is turned
//! into a pod of sequential containers; the [`Executor`] follows the pod's
//! container states, moves files in and out over exec channels, and returns
//! the evaluation's result code.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod render;
pub mod storage;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use cluster::{ClusterApplyClient, ExecChannel, KubeClusterClient, Manifest};
pub use config::{LoggingConfig, LunaConfig};
pub use engine::{ContainerRole, Executor, PodHandle};
pub use error::{LunaError, LunaResult};
pub use render::{ClusterContext, ManifestRenderer, TeraManifestRenderer};
pub use storage::{FileStat, LocalFsStorage, MemoryStorage, StorageBackend};
pub use task::{CopyIn, CopyOut, TaskSpec};
