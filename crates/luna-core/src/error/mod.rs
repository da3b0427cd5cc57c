//! Error types for the Luna task execution engine
//!
//! `LunaError` is the error returned by every engine operation. Port-level
//! failures keep their own types (`ClusterError`, `StorageError`) and convert
//! into `LunaError` with `?`.
//!
//! A compute stage that exits non-zero is not an error: `Executor::evaluate`
//! reports it as its return code.

mod constructors;
mod types;

pub use types::{ApplyFailure, LunaError, LunaResult};
