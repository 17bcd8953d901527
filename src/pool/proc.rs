//! Process handle for pool child processes.
//!
//! Wraps a child process with buffered pipes for the IPC protocol.

use super::protocol::{WorkRequest, WorkResponse};
use crate::analysis::Analysis;
use crate::error::{PipelineError, Result};
use crate::types::Frame;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

/// Command-line flag that switches the binary into pool-child mode
pub const INTERNAL_WORKER_FLAG: &str = "--internal-worker";

/// IPC buffer size (64KB).
const IPC_BUFFER_SIZE: usize = 64 * 1024;

/// Handle to one analysis child process.
pub struct PoolProcess {
    child: Child,
    writer: BufWriter<ChildStdin>,
    reader: BufReader<ChildStdout>,
    /// Whether the process has been reaped
    reaped: bool,
}

impl PoolProcess {
    /// Spawn `program --internal-worker` with piped stdin/stdout.
    ///
    /// The child's stderr is inherited so its logs reach the parent's terminal.
    pub fn spawn(program: &Path) -> Result<Self> {
        let child = Command::new(program)
            .arg(INTERNAL_WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                PipelineError::ProcessPool(format!("Failed to spawn {:?}: {}", program, e))
            })?;

        Self::from_child(child)
    }

    /// Wrap an already spawned child, taking ownership of its stdin and stdout.
    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::ProcessPool("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::ProcessPool("Child stdout not captured".into()))?;

        Ok(Self {
            child,
            writer: BufWriter::with_capacity(IPC_BUFFER_SIZE, stdin),
            reader: BufReader::with_capacity(IPC_BUFFER_SIZE, stdout),
            reaped: false,
        })
    }

    /// OS process id
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until the child announces it is ready.
    pub fn wait_for_ready(&mut self) -> Result<()> {
        match WorkResponse::recv(&mut self.reader)? {
            Some((WorkResponse::Ready, _)) => Ok(()),
            Some((other, _)) => Err(PipelineError::ProcessPool(format!(
                "Process {} sent {:?} instead of Ready",
                self.pid(),
                other
            ))),
            None => Err(PipelineError::ProcessPool(format!(
                "Process {} closed its output before Ready",
                self.pid()
            ))),
        }
    }

    /// Run one analysis in the child and wait for the result.
    ///
    /// A `None` response means the child exited mid-request.
    pub fn apply(&mut self, analysis: &Analysis, frame: &Frame) -> Result<Option<Result<Frame>>> {
        WorkRequest::send_apply(&mut self.writer, analysis, frame)?;

        match WorkResponse::recv(&mut self.reader)? {
            Some((WorkResponse::Result { .. }, Some(frame))) => Ok(Some(Ok(frame))),
            Some((WorkResponse::Error { message }, _)) => {
                Ok(Some(Err(PipelineError::Processing(message))))
            }
            Some((other, _)) => Err(PipelineError::ProcessPool(format!(
                "Process {} sent unexpected response: {:?}",
                self.pid(),
                other
            ))),
            None => Ok(None),
        }
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.reaped = true;
                false
            }
        }
    }

    /// Gracefully stop the child: send exit, wait up to `timeout`, then kill.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        if self.reaped {
            return Ok(());
        }

        let _ = WorkRequest::send_exit(&mut self.writer);

        let start = Instant::now();
        while start.elapsed() < timeout {
            if !self.is_running() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::warn!(pid = self.pid(), "Pool process ignored exit request, killing");
        self.kill()
    }

    /// Kill the child and reap it.
    pub fn kill(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        // kill() fails if the child already exited; wait() still reaps it
        let _ = self.child.kill();
        self.child.wait().map_err(|e| {
            PipelineError::ProcessPool(format!("Failed to reap process {}: {}", self.pid(), e))
        })?;
        self.reaped = true;
        Ok(())
    }
}

impl Drop for PoolProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.kill();
        }
    }
}
