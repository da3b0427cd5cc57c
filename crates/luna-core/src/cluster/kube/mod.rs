//! Kubernetes implementation of the cluster port
//!
//! - Documents are applied with server-side apply, so re-applying a batch
//!   updates the same named resources instead of duplicating them.
//! - Deletes use background propagation and treat `404` as already deleted.
//! - Exec channels run over the API server's websocket exec endpoint.

mod client;
mod exec;

pub use client::KubeClusterClient;
pub use exec::KubeExecChannel;
