//! Cluster access
//!
//! The engine talks to the container platform only through the
//! [`ClusterApplyClient`] port. [`KubeClusterClient`] implements it for
//! Kubernetes; tests use `testing::FakeCluster` or a mockall mock.

pub mod client;
pub mod exec;
pub mod kube;
pub mod manifest;

pub use client::{
    AppliedObject, ClusterApplyClient, ClusterError, ClusterResult, ContainerState,
    ContainerStatus, PodStatus, ResourceKey,
};
pub use exec::ExecChannel;
pub use self::kube::{KubeClusterClient, KubeExecChannel};
pub use manifest::Manifest;

#[cfg(test)]
pub use client::MockClusterApplyClient;
