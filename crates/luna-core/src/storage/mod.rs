//! Storage backends
//!
//! The engine reads copy-in sources from and writes copy-out results to a
//! [`StorageBackend`]. Paths are always relative to the backend's root.
//!
//! # Backends
//! - [`LocalFsStorage`]: a directory on the local filesystem
//! - [`MemoryStorage`]: in-process map, used by tests and dry runs

pub mod backend;
pub mod local_fs;
pub mod memory;

pub use backend::{
    ByteStream, FileStat, StorageBackend, StorageError, StorageResult, normalize_path,
};
pub use local_fs::LocalFsStorage;
pub use memory::MemoryStorage;
