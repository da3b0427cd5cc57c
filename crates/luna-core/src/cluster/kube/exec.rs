//! Exec channel over the Kubernetes websocket exec endpoint

use std::time::Duration;

use async_trait::async_trait;
use ::kube::api::AttachedProcess;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cluster::client::{ClusterError, ClusterResult};
use crate::cluster::exec::ExecChannel;

const READ_CHUNK: usize = 16 * 1024;

enum Frame {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Eof,
}

/// [`ExecChannel`] backed by an attached kube process
///
/// Stdout and stderr are pumped by background tasks so the remote side never
/// stalls on a full pipe; `poll` moves what they received into local buffers.
pub struct KubeExecChannel {
    process: Option<AttachedProcess>,
    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    frames: mpsc::UnboundedReceiver<Frame>,
    open_streams: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    close_grace: Duration,
}

impl KubeExecChannel {
    pub fn spawn(mut process: AttachedProcess, close_grace: Duration) -> Self {
        let (tx, frames) = mpsc::unbounded_channel();
        let mut open_streams = 0;

        if let Some(stdout) = process.stdout() {
            open_streams += 1;
            tokio::spawn(pump(stdout, tx.clone(), Frame::Stdout));
        }
        if let Some(stderr) = process.stderr() {
            open_streams += 1;
            tokio::spawn(pump(stderr, tx.clone(), Frame::Stderr));
        }
        let stdin = process
            .stdin()
            .map(|w| Box::new(w) as Box<dyn AsyncWrite + Send + Unpin>);

        Self {
            process: Some(process),
            stdin,
            frames,
            open_streams,
            stdout: Vec::new(),
            stderr: Vec::new(),
            close_grace,
        }
    }

    fn apply(&mut self, frame: Frame) {
        match frame {
            Frame::Stdout(bytes) => self.stdout.extend_from_slice(&bytes),
            Frame::Stderr(bytes) => self.stderr.extend_from_slice(&bytes),
            Frame::Eof => self.open_streams = self.open_streams.saturating_sub(1),
        }
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Frame>, wrap: fn(Vec<u8>) -> Frame)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "Exec stream ended with error");
                break;
            }
        }
    }
    let _ = tx.send(Frame::Eof);
}

#[async_trait]
impl ExecChannel for KubeExecChannel {
    fn is_open(&self) -> bool {
        self.open_streams > 0
    }

    async fn poll(&mut self, timeout: Duration) -> ClusterResult<()> {
        if self.open_streams == 0 {
            return Ok(());
        }
        match tokio::time::timeout(timeout, self.frames.recv()).await {
            Ok(Some(frame)) => self.apply(frame),
            Ok(None) => self.open_streams = 0,
            Err(_) => {}
        }
        while let Ok(frame) = self.frames.try_recv() {
            self.apply(frame);
        }
        Ok(())
    }

    fn has_stdout(&self) -> bool {
        !self.stdout.is_empty()
    }

    fn read_stdout(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stdout)
    }

    fn has_stderr(&self) -> bool {
        !self.stderr.is_empty()
    }

    fn read_stderr(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.stderr)
    }

    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ClusterError::Exec("stdin is not attached".to_string()))?;
        stdin
            .write_all(data)
            .await
            .map_err(|e| ClusterError::Exec(format!("write to stdin failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| ClusterError::Exec(format!("flush of stdin failed: {}", e)))
    }

    async fn close(&mut self) -> ClusterResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            // EOF lets pipelines like `base64 -d | tar x` finish
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "Closing stdin failed");
            }
        }
        if let Some(process) = self.process.take() {
            match tokio::time::timeout(self.close_grace, process.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Exec process ended abnormally"),
                Err(_) => warn!(
                    grace = ?self.close_grace,
                    "Exec process still running after close, detaching"
                ),
            }
        }
        Ok(())
    }
}
