//! In-process stand-ins for the cluster and the renderer
//!
//! [`FakeCluster`] simulates one pod per applied `Pod` document: init
//! containers run strictly in order, one state step per status read, and exec
//! channels act on an in-memory filesystem using the same framing as a real
//! container would.

mod fake_cluster;
mod static_renderer;

pub use fake_cluster::{ExecRecord, FakeCluster, FakeExecChannel, StageBehavior};
pub use static_renderer::StaticRenderer;
