//! In-memory storage backend

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::backend::{
    ByteStream, FileStat, StorageBackend, StorageError, StorageResult, normalize_path,
};

#[derive(Debug, Clone)]
struct StoredFile {
    bytes: Arc<Vec<u8>>,
    modified: DateTime<Utc>,
}

/// Storage kept in a process-local map
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<RwLock<BTreeMap<String, StoredFile>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes directly, bypassing the async stream interface
    pub fn insert(&self, relative_path: &str, bytes: impl Into<Vec<u8>>) -> StorageResult<()> {
        let normalized = normalize_path(relative_path)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidPath(relative_path.to_string()));
        }
        self.files.write().insert(
            normalized,
            StoredFile {
                bytes: Arc::new(bytes.into()),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    /// Content of a stored file
    pub fn read(&self, relative_path: &str) -> Option<Vec<u8>> {
        let normalized = normalize_path(relative_path).ok()?;
        self.files
            .read()
            .get(&normalized)
            .map(|f| f.bytes.as_ref().clone())
    }

    /// All stored paths in sorted order
    pub fn paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    fn stat_of(path: &str, file: &StoredFile) -> FileStat {
        FileStat::new(path, file.bytes.len() as u64, file.modified)
    }
}

fn is_below(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn put(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        relative_path: &str,
    ) -> StorageResult<()> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)
            .await
            .map_err(|e| StorageError::io(relative_path, e))?;
        self.insert(relative_path, bytes)
    }

    async fn get(&self, relative_path: &str) -> StorageResult<(ByteStream, FileStat)> {
        let normalized = normalize_path(relative_path)?;
        let files = self.files.read();
        let file = files
            .get(&normalized)
            .ok_or_else(|| StorageError::NotFound(normalized.clone()))?;
        let stat = Self::stat_of(&normalized, file);
        let reader = Cursor::new(file.bytes.as_ref().clone());
        Ok((Box::new(reader), stat))
    }

    async fn stat(&self, relative_path: &str) -> StorageResult<FileStat> {
        let normalized = normalize_path(relative_path)?;
        self.files
            .read()
            .get(&normalized)
            .map(|f| Self::stat_of(&normalized, f))
            .ok_or(StorageError::NotFound(normalized))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<FileStat>> {
        let prefix = normalize_path(prefix)?;
        Ok(self
            .files
            .read()
            .iter()
            .filter(|(path, _)| is_below(path, &prefix))
            .map(|(path, file)| Self::stat_of(path, file))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_respects_directory_boundaries() {
        let storage = MemoryStorage::new();
        storage.insert("model/a", "1").unwrap();
        storage.insert("model/sub/b", "22").unwrap();
        storage.insert("models/c", "3").unwrap();

        let listed = storage.list("/model/").await.unwrap();
        let paths: Vec<_> = listed.iter().map(|s| s.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["model/a", "model/sub/b"]);
        assert_eq!(listed[1].size_bytes, 2);
    }

    #[tokio::test]
    async fn test_put_replaces_content() {
        let storage = MemoryStorage::new();
        let mut first: &[u8] = b"first";
        storage.put(&mut first, "out/result").await.unwrap();
        let mut second: &[u8] = b"second";
        storage.put(&mut second, "/out/result").await.unwrap();

        assert_eq!(storage.read("out/result").unwrap(), b"second");
        assert_eq!(storage.paths(), vec!["out/result".to_string()]);
    }
}
