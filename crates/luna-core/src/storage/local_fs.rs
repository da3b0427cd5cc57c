//! Local filesystem storage backend

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncRead;
use walkdir::WalkDir;

use super::backend::{
    ByteStream, FileStat, StorageBackend, StorageError, StorageResult, normalize_path,
};

/// Storage rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    root: PathBuf,
}

impl LocalFsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative_path: &str) -> StorageResult<(String, PathBuf)> {
        let normalized = normalize_path(relative_path)?;
        let absolute = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        Ok((normalized, absolute))
    }

    fn stat_from_metadata(relative_path: String, metadata: &std::fs::Metadata) -> FileStat {
        let modified: DateTime<Utc> = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        FileStat::new(relative_path, metadata.len(), modified)
    }
}

#[async_trait]
impl StorageBackend for LocalFsStorage {
    async fn put(
        &self,
        data: &mut (dyn AsyncRead + Send + Unpin),
        relative_path: &str,
    ) -> StorageResult<()> {
        let (normalized, absolute) = self.resolve(relative_path)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidPath(relative_path.to_string()));
        }

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(&normalized, e))?;
        }

        let mut file = fs::File::create(&absolute)
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;
        tokio::io::copy(data, &mut file)
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;

        tracing::trace!(path = %normalized, "Stored file");
        Ok(())
    }

    async fn get(&self, relative_path: &str) -> StorageResult<(ByteStream, FileStat)> {
        let (normalized, absolute) = self.resolve(relative_path)?;
        let file = fs::File::open(&absolute)
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(normalized));
        }

        let stat = Self::stat_from_metadata(normalized, &metadata);
        Ok((Box::new(file), stat))
    }

    async fn stat(&self, relative_path: &str) -> StorageResult<FileStat> {
        let (normalized, absolute) = self.resolve(relative_path)?;
        let metadata = fs::metadata(&absolute)
            .await
            .map_err(|e| StorageError::io(&normalized, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(normalized));
        }
        Ok(Self::stat_from_metadata(normalized, &metadata))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<FileStat>> {
        let (normalized, absolute) = self.resolve(prefix)?;
        let root = self.root.clone();

        let listed = tokio::task::spawn_blocking(move || -> StorageResult<Vec<FileStat>> {
            if !absolute.exists() {
                return Ok(Vec::new());
            }

            let mut stats = Vec::new();
            for entry in WalkDir::new(&absolute).follow_links(false) {
                let entry = entry.map_err(|e| {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| normalized.clone());
                    StorageError::io(path, std::io::Error::other(e.to_string()))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }

                // relative to the storage root, computed component-wise
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .map_err(|_| StorageError::InvalidPath(entry.path().display().to_string()))?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                let metadata = entry
                    .metadata()
                    .map_err(|e| StorageError::io(&relative, std::io::Error::other(e.to_string())))?;
                stats.push(Self::stat_from_metadata(relative, &metadata));
            }
            Ok(stats)
        })
        .await
        .map_err(|e| StorageError::io(prefix, std::io::Error::other(e.to_string())))??;

        Ok(listed)
    }
}
