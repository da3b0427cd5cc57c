//! File transfer over exec channels

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::SpooledTempFile;
use tokio::sync::mpsc;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::framing::{self, ArchiveWriter};
use super::pod::PodHandle;
use crate::cluster::{ClusterApplyClient, ExecChannel};
use crate::config::{PollingConfig, TransferConfig};
use crate::error::{LunaError, LunaResult};
use crate::storage::{normalize_path, StorageBackend};
use crate::task::{CopyIn, CopyOut};

const STDIN_CHUNK: usize = 256 * 1024;

/// Settings for [`FileTransferChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Touched in the container once a transfer step is complete
    pub completion_marker: String,
    pub spool_threshold: usize,
    /// How long a single channel poll waits for output
    pub channel_poll_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::new(&TransferConfig::default(), &PollingConfig::default())
    }
}

impl TransferSettings {
    pub fn new(transfer: &TransferConfig, polling: &PollingConfig) -> Self {
        Self {
            completion_marker: transfer.completion_marker.clone(),
            spool_threshold: transfer.spool_threshold,
            channel_poll_timeout: polling.channel_poll_timeout,
        }
    }
}

/// Moves directory trees between storage and running containers
///
/// Only stdin, stdout and stderr of an exec channel are used: copy-in pipes a
/// base64 gzip tar into `tar x`, copy-out reads back the base64 of `tar c`.
pub struct FileTransferChannel {
    client: Arc<dyn ClusterApplyClient>,
    storage: Arc<dyn StorageBackend>,
    settings: TransferSettings,
    cancel: CancellationToken,
}

impl FileTransferChannel {
    pub fn new(
        client: Arc<dyn ClusterApplyClient>,
        storage: Arc<dyn StorageBackend>,
        settings: TransferSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            storage,
            settings,
            cancel,
        }
    }

    /// Copy everything below `spec.storage_prefix` into `spec.container_path`
    ///
    /// Returns the number of files sent. An empty prefix sends nothing.
    #[instrument(skip(self, spec), fields(pod = %pod, prefix = %spec.storage_prefix, path = %spec.container_path))]
    pub async fn copy_in(&self, pod: &PodHandle, container: &str, spec: &CopyIn) -> LunaResult<usize> {
        let mut channel = self
            .client
            .exec(
                &pod.namespace,
                &pod.name,
                container,
                &framing::copy_in_command(&spec.container_path),
            )
            .await?;

        let result = self.send_tree(channel.as_mut(), spec).await;
        let closed = channel.close().await;
        let sent = result?;
        closed?;

        info!(files = sent, "Copy-in complete");
        Ok(sent)
    }

    async fn send_tree(&self, channel: &mut dyn ExecChannel, spec: &CopyIn) -> LunaResult<usize> {
        let prefix = normalize_path(&spec.storage_prefix)?;
        let files = self.storage.list(&prefix).await?;
        if files.is_empty() {
            debug!("Nothing stored below prefix");
            return Ok(0);
        }

        let mut archive = ArchiveWriter::new(self.settings.spool_threshold);
        for file in &files {
            self.check_cancelled()?;
            let name = relative_entry_name(&file.relative_path, &prefix)?;
            let (stream, _) = self.storage.get(&file.relative_path).await?;
            let reader = SyncIoBridge::new(stream);
            let size = file.size_bytes;
            let mtime = u64::try_from(file.last_modified.timestamp()).unwrap_or(0);

            archive = tokio::task::spawn_blocking(move || {
                archive.append_file(&name, size, mtime, reader)?;
                Ok::<_, LunaError>(archive)
            })
            .await
            .map_err(|e| LunaError::transfer(format!("archive task failed: {}", e)))??;
        }

        let threshold = self.settings.spool_threshold;
        let payload = tokio::task::spawn_blocking(move || {
            let compressed = archive.finish()?;
            framing::encode_base64(compressed, threshold)
        })
        .await
        .map_err(|e| LunaError::transfer(format!("encode task failed: {}", e)))??;

        let mut payload = Some(payload);
        while channel.is_open() {
            self.check_cancelled()?;
            channel.poll(self.settings.channel_poll_timeout).await?;
            drain_to_log(channel);
            if let Some(payload) = payload.take() {
                write_payload(channel, payload).await?;
                break;
            }
        }
        if payload.is_some() {
            return Err(LunaError::transfer_with_path(
                "exec channel closed before the payload was sent",
                spec.container_path.as_str(),
            ));
        }
        Ok(files.len())
    }

    /// Copy everything below `spec.container_path` into `spec.storage_prefix`
    ///
    /// Returns the number of files stored.
    #[instrument(skip(self, spec), fields(pod = %pod, path = %spec.container_path, prefix = %spec.storage_prefix))]
    pub async fn copy_out(&self, pod: &PodHandle, container: &str, spec: &CopyOut) -> LunaResult<usize> {
        let mut channel = self
            .client
            .exec(
                &pod.namespace,
                &pod.name,
                container,
                &framing::copy_out_command(&spec.container_path),
            )
            .await?;

        let captured = self.capture_output(channel.as_mut()).await;
        let closed = channel.close().await;
        let (encoded, stderr) = captured?;
        closed?;

        let stored = self.store_tree(encoded, stderr, spec).await?;
        info!(files = stored, "Copy-out complete");
        Ok(stored)
    }

    /// Stdout into a spooled buffer and stderr as text, until the channel closes
    async fn capture_output(
        &self,
        channel: &mut dyn ExecChannel,
    ) -> LunaResult<(SpooledTempFile, String)> {
        let mut encoded = SpooledTempFile::new(self.settings.spool_threshold);
        let mut stderr = String::new();
        loop {
            self.check_cancelled()?;
            if channel.has_stdout() {
                encoded
                    .write_all(&channel.read_stdout())
                    .map_err(|e| LunaError::transfer(format!("failed to buffer output: {}", e)))?;
            }
            if let Some(text) = drain_stderr(channel) {
                stderr.push_str(&text);
            }
            if !channel.is_open() {
                break;
            }
            channel.poll(self.settings.channel_poll_timeout).await?;
        }
        Ok((encoded, stderr))
    }

    async fn store_tree(
        &self,
        mut encoded: SpooledTempFile,
        stderr: String,
        spec: &CopyOut,
    ) -> LunaResult<usize> {
        let prefix = normalize_path(&spec.storage_prefix)?;
        let container_path = spec.container_path.clone();
        let threshold = self.settings.spool_threshold;
        let (tx, mut rx) = mpsc::channel::<(String, Vec<u8>)>(1);

        let parser = tokio::task::spawn_blocking(move || {
            encoded
                .rewind()
                .map_err(|e| LunaError::transfer(format!("failed to rewind output: {}", e)))?;
            let mut archive = framing::decode_base64(encoded, threshold)?;
            // tar writes at least its end-of-archive blocks, even for an empty directory
            let size = archive
                .seek(SeekFrom::End(0))
                .map_err(|e| LunaError::transfer(format!("failed to measure archive: {}", e)))?;
            if size == 0 {
                return Err(missing_archive(&container_path, &stderr));
            }
            archive
                .rewind()
                .map_err(|e| LunaError::transfer(format!("failed to rewind archive: {}", e)))?;
            framing::for_each_file(archive, |relative, content| {
                tx.blocking_send((relative, content))
                    .map_err(|_| LunaError::transfer("copy-out receiver stopped"))
            })
        });

        let mut stored = 0;
        let mut store_error = None;
        while let Some((relative, content)) = rx.recv().await {
            let target = join_storage_path(&prefix, &relative);
            debug!(path = %target, bytes = content.len(), "Storing file");
            if let Err(e) = self.storage.put(&mut content.as_slice(), &target).await {
                store_error = Some(LunaError::from(e));
                break;
            }
            stored += 1;
        }
        drop(rx);

        let parsed = parser
            .await
            .map_err(|e| LunaError::transfer(format!("archive task failed: {}", e)))?;
        if let Some(e) = store_error {
            return Err(e);
        }
        parsed?;
        Ok(stored)
    }

    /// Create the completion marker inside `container`
    #[instrument(skip(self), fields(pod = %pod))]
    pub async fn signal_completion(&self, pod: &PodHandle, container: &str) -> LunaResult<()> {
        let mut channel = self
            .client
            .exec(
                &pod.namespace,
                &pod.name,
                container,
                &framing::marker_command(&self.settings.completion_marker),
            )
            .await?;
        while channel.is_open() {
            self.check_cancelled()?;
            channel.poll(self.settings.channel_poll_timeout).await?;
            drain_to_log(channel.as_mut());
        }
        channel.close().await?;
        debug!(marker = %self.settings.completion_marker, "Completion marker written");
        Ok(())
    }

    fn check_cancelled(&self) -> LunaResult<()> {
        if self.cancel.is_cancelled() {
            Err(LunaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

async fn write_payload(channel: &mut dyn ExecChannel, mut payload: SpooledTempFile) -> LunaResult<()> {
    let mut chunk = vec![0u8; STDIN_CHUNK];
    let mut total = 0usize;
    loop {
        let n = payload
            .read(&mut chunk)
            .map_err(|e| LunaError::transfer(format!("failed to read payload: {}", e)))?;
        if n == 0 {
            break;
        }
        channel.write_stdin(&chunk[..n]).await?;
        total += n;
    }
    debug!(bytes = total, "Payload written to stdin");
    Ok(())
}

fn drain_to_log(channel: &mut dyn ExecChannel) {
    if channel.has_stdout() {
        let out = channel.read_stdout();
        debug!(stdout = %String::from_utf8_lossy(&out).trim_end(), "Remote output");
    }
    drain_stderr(channel);
}

fn drain_stderr(channel: &mut dyn ExecChannel) -> Option<String> {
    if !channel.has_stderr() {
        return None;
    }
    let text = String::from_utf8_lossy(&channel.read_stderr()).into_owned();
    debug!(stderr = %text.trim_end(), "Remote error output");
    Some(text)
}

fn missing_archive(container_path: &str, stderr: &str) -> LunaError {
    let stderr = stderr.trim();
    let detail = if stderr.is_empty() {
        "no error output".to_string()
    } else {
        stderr.to_string()
    };
    LunaError::transfer_with_path(
        format!("copy-out of {} produced no archive ({})", container_path, detail),
        container_path,
    )
}

/// Archive entry name of `relative_path` below `prefix`, component-wise
fn relative_entry_name(relative_path: &str, prefix: &str) -> LunaResult<String> {
    let path = Path::new(relative_path);
    let relative = path.strip_prefix(prefix).map_err(|_| {
        LunaError::transfer_with_path(
            format!("listed file is not below prefix '{}'", prefix),
            relative_path,
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        // the prefix names a single file
        return path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LunaError::transfer_with_path("file has no name", relative_path));
    }
    Ok(parts.join("/"))
}

fn join_storage_path(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterResult, MockClusterApplyClient};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    /// What `tar cf - -C <missing dir> .` does: nothing on stdout, a complaint on stderr
    struct MissingDirChannel {
        stderr: Vec<u8>,
        open: bool,
    }

    #[async_trait]
    impl ExecChannel for MissingDirChannel {
        fn is_open(&self) -> bool {
            self.open
        }

        async fn poll(&mut self, _timeout: Duration) -> ClusterResult<()> {
            self.stderr.extend_from_slice(
                b"tar: /workspace/scroe: Cannot open: No such file or directory\n",
            );
            self.open = false;
            Ok(())
        }

        fn has_stdout(&self) -> bool {
            false
        }

        fn read_stdout(&mut self) -> Vec<u8> {
            Vec::new()
        }

        fn has_stderr(&self) -> bool {
            !self.stderr.is_empty()
        }

        fn read_stderr(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.stderr)
        }

        async fn write_stdin(&mut self, _data: &[u8]) -> ClusterResult<()> {
            Ok(())
        }

        async fn close(&mut self) -> ClusterResult<()> {
            self.open = false;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_copy_out_without_archive_is_transfer_error() {
        let mut mock = MockClusterApplyClient::new();
        mock.expect_exec().times(1).returning(|_, _, _, _| {
            Ok(Box::new(MissingDirChannel {
                stderr: Vec::new(),
                open: true,
            }) as Box<dyn ExecChannel>)
        });
        let storage = Arc::new(MemoryStorage::new());
        let channel = FileTransferChannel::new(
            Arc::new(mock),
            storage.clone(),
            TransferSettings::default(),
            CancellationToken::new(),
        );

        let err = channel
            .copy_out(
                &PodHandle::new("default", "luna-t1"),
                "post-task",
                &CopyOut::new("/workspace/scroe", "results"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "LUNA_TRANSFER");
        let text = err.to_string();
        assert!(text.contains("/workspace/scroe"));
        assert!(text.contains("Cannot open: No such file or directory"));
        assert!(storage.paths().is_empty());
    }

    #[test]
    fn test_relative_entry_name() {
        assert_eq!(
            relative_entry_name("model/weights.bin", "model").unwrap(),
            "weights.bin"
        );
        assert_eq!(
            relative_entry_name("model/sub/a.txt", "model").unwrap(),
            "sub/a.txt"
        );
        assert_eq!(relative_entry_name("a/b.txt", "").unwrap(), "a/b.txt");
        assert_eq!(
            relative_entry_name("model/weights.bin", "model/weights.bin").unwrap(),
            "weights.bin"
        );
        // component-wise: proj1 is not a prefix of proj10
        assert!(relative_entry_name("proj10/file", "proj1").is_err());
    }

    #[test]
    fn test_join_storage_path() {
        assert_eq!(join_storage_path("", "out.txt"), "out.txt");
        assert_eq!(join_storage_path("runs/1", "score/out.txt"), "runs/1/score/out.txt");
    }

    #[test]
    fn test_default_settings() {
        let settings = TransferSettings::default();
        assert_eq!(settings.completion_marker, "/tmp/done");
        assert_eq!(settings.channel_poll_timeout, Duration::from_secs(1));
    }
}
