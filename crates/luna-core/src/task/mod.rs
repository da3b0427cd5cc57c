//! Task descriptions
//!
//! A [`TaskSpec`] describes one evaluation run: the stage images and commands
//! and which directories move between storage and the pod.

mod spec;

pub use spec::{CopyIn, CopyOut, TaskSpec};
