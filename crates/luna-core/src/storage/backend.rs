//! Storage port definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Readable byte stream handed out by a backend
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found in storage: {0}")]
    NotFound(String),

    #[error("Invalid storage path: '{0}'")]
    InvalidPath(String),

    #[error("Storage IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path.into());
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Snapshot of one stored file, taken at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Normalized path relative to the backend root, without leading `/`
    pub relative_path: String,
    pub size_bytes: u64,
    /// `<size>-<mtime>-<path>`; detects changes, is not a content hash
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl FileStat {
    /// Build a stat with the composite etag
    pub fn new(relative_path: impl Into<String>, size_bytes: u64, modified: DateTime<Utc>) -> Self {
        let relative_path = relative_path.into();
        let etag = format!(
            "{}-{}.{:09}-{}",
            size_bytes,
            modified.timestamp(),
            modified.timestamp_subsec_nanos(),
            relative_path
        );
        Self {
            relative_path,
            size_bytes,
            etag,
            // second precision, like the filesystem listing it mirrors
            last_modified: DateTime::from_timestamp(modified.timestamp(), 0).unwrap_or(modified),
        }
    }
}

/// Byte-addressable object store over relative paths
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store everything readable from `data` at `relative_path`, replacing any previous content
    async fn put(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        relative_path: &str,
    ) -> StorageResult<()>;

    /// Open a stored file together with its stat
    async fn get(&self, relative_path: &str) -> StorageResult<(ByteStream, FileStat)>;

    async fn stat(&self, relative_path: &str) -> StorageResult<FileStat>;

    /// Every file below `prefix`, recursively. Order is unspecified; a missing
    /// prefix yields an empty list.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<FileStat>>;
}

/// Normalize a relative storage path: drop empty and `.` segments, reject `..`.
///
/// `"/proj1//./file1"` becomes `"proj1/file1"`; the root is `""`.
pub fn normalize_path(path: &str) -> StorageResult<String> {
    let mut parts = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/proj1//./file1").unwrap(), "proj1/file1");
        assert_eq!(normalize_path("model/").unwrap(), "model");
        assert_eq!(normalize_path("/").unwrap(), "");
        assert!(normalize_path("model/../../etc").is_err());
    }

    #[test]
    fn test_etag_is_composite_not_hash() {
        let modified = DateTime::from_timestamp(1_700_000_000, 500).unwrap();
        let stat = FileStat::new("model/weights.bin", 10, modified);
        assert_eq!(stat.etag, "10-1700000000.000000500-model/weights.bin");
        assert_eq!(stat.last_modified.timestamp_subsec_nanos(), 0);
    }
}
