//! Exec channel port
//!
//! An exec channel runs one command inside a container and carries nothing
//! but byte streams: stdin in, stdout and stderr out. The transfer protocol in
//! `engine::transfer` is built on top of exactly these operations.

use std::time::Duration;

use async_trait::async_trait;

use super::client::ClusterResult;

/// Remote command execution stream
#[async_trait]
pub trait ExecChannel: Send {
    /// False once the remote side has closed its output streams
    fn is_open(&self) -> bool;

    /// Wait up to `timeout` for new output and buffer whatever arrived
    async fn poll(&mut self, timeout: Duration) -> ClusterResult<()>;

    fn has_stdout(&self) -> bool;

    /// Take all buffered stdout bytes
    fn read_stdout(&mut self) -> Vec<u8>;

    fn has_stderr(&self) -> bool;

    /// Take all buffered stderr bytes
    fn read_stderr(&mut self) -> Vec<u8>;

    /// Send bytes to the remote stdin
    async fn write_stdin(&mut self, data: &[u8]) -> ClusterResult<()>;

    /// Close stdin and release the channel
    async fn close(&mut self) -> ClusterResult<()>;
}
