//! Docker-compatible CLI runner.
//!
//! Spawns `<runtime> run ...`, reads both output streams to completion under
//! a capture cap and an optional wall-clock limit, and kills the container by
//! name when either limit trips or the caller goes away.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use super::{ExecutionResult, ExitStatus, SandboxConfig, SandboxRunner};
use crate::config::SandboxSettings;
use crate::error::SandboxError;

/// How long `<runtime> kill` may take before we give up on it.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 8 * 1024;

/// Runner that shells out to `docker` (or anything accepting the same arguments).
#[derive(Debug, Clone)]
pub struct DockerRunner {
    runtime: String,
    runtime_args: Vec<String>,
    timeout: Option<Duration>,
    max_output_bytes: usize,
}

impl DockerRunner {
    pub fn new(runtime: impl Into<String>) -> Self {
        let defaults = SandboxSettings::default();
        Self {
            runtime: runtime.into(),
            runtime_args: Vec::new(),
            timeout: defaults.timeout(),
            max_output_bytes: defaults.max_output_bytes,
        }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            runtime: settings.runtime.clone(),
            runtime_args: settings.runtime_args.clone(),
            timeout: settings.timeout(),
            max_output_bytes: settings.max_output_bytes,
        }
    }

    #[must_use]
    pub fn with_runtime_args(mut self, args: Vec<String>) -> Self {
        self.runtime_args = args;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(&self.runtime_args);
        cmd
    }

    /// Kill the container, then the CLI process attached to it.
    async fn terminate(&self, child: &mut Child, config: &SandboxConfig) {
        let mut cmd = self.command();
        cmd.args(config.kill_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(STOP_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => debug!(%status, "Sandbox kill finished"),
            Ok(Err(e)) => warn!(error = %e, "Failed to run sandbox kill"),
            Err(_) => warn!("Sandbox kill did not finish within {STOP_TIMEOUT:?}"),
        }

        if let Err(e) = child.kill().await {
            debug!(error = %e, "Sandbox process already gone");
        }
    }
}

#[async_trait]
impl SandboxRunner for DockerRunner {
    #[instrument(skip(self, config), fields(container = %config.container_name, filter = %config.selection_filter))]
    async fn run(&self, config: &SandboxConfig) -> Result<ExecutionResult, SandboxError> {
        debug!(image = %config.image, "Launching sandbox");

        let mut cmd = self.command();
        cmd.args(config.run_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SandboxError::Launch {
            runtime: self.runtime.clone(),
            source,
        })?;

        // Dropped before `child` on every early exit, including cancellation.
        let mut guard = ContainerGuard::new(self.command(), config);

        let mut child_stdout = child.stdout.take().ok_or(SandboxError::MissingPipe("stdout"))?;
        let mut child_stderr = child.stderr.take().ok_or(SandboxError::MissingPipe("stderr"))?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let cap = self.max_output_bytes;

        let outcome = {
            let observe = async {
                tokio::try_join!(
                    read_capped(&mut child_stdout, &mut stdout_buf, cap, "stdout"),
                    read_capped(&mut child_stderr, &mut stderr_buf, cap, "stderr"),
                )?;
                child.wait().await.map_err(Halt::Wait)
            };

            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, observe)
                    .await
                    .unwrap_or(Err(Halt::TimedOut)),
                None => observe.await,
            }
        };

        let status = match outcome {
            Ok(status) => ExitStatus::Exited(status.code().unwrap_or(-1)),
            Err(Halt::TimedOut) => {
                warn!(timeout = ?self.timeout, "Sandbox exceeded wall-clock limit");
                self.terminate(&mut child, config).await;
                ExitStatus::TimedOut
            }
            Err(Halt::Overflow(stream)) => {
                warn!(stream, cap, "Sandbox exceeded output cap");
                self.terminate(&mut child, config).await;
                ExitStatus::OutputLimitExceeded
            }
            Err(Halt::Read { stream, source }) => {
                self.terminate(&mut child, config).await;
                guard.disarm();
                return Err(SandboxError::Read { stream, source });
            }
            Err(Halt::Wait(source)) => return Err(SandboxError::Wait(source)),
        };
        guard.disarm();

        let result = ExecutionResult {
            status,
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
        };

        debug!(
            exit_code = result.exit_code(),
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Sandbox finished"
        );

        Ok(result)
    }
}

/// Why observation of the sandbox stopped early.
#[derive(Debug)]
enum Halt {
    TimedOut,
    Overflow(&'static str),
    Read {
        stream: &'static str,
        source: io::Error,
    },
    Wait(io::Error),
}

/// Append `reader` to `buf` until EOF, or fail once more than `cap` bytes arrive.
///
/// On overflow `buf` holds exactly the first `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
    stream: &'static str,
) -> Result<(), Halt> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|source| Halt::Read { stream, source })?;
        if n == 0 {
            return Ok(());
        }
        let room = cap.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
        if n > room {
            return Err(Halt::Overflow(stream));
        }
    }
}

/// Fires `<runtime> kill <name>` in the background if dropped while armed.
///
/// Killing the CLI process alone does not stop a container, so a cancelled
/// `run` needs this to avoid leaving the sandbox behind.
struct ContainerGuard {
    kill: Option<Command>,
    name: String,
}

impl ContainerGuard {
    fn new(mut cmd: Command, config: &SandboxConfig) -> Self {
        cmd.args(config.kill_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Self {
            kill: Some(cmd),
            name: config.container_name.clone(),
        }
    }

    fn disarm(&mut self) {
        self.kill = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(mut cmd) = self.kill.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container = %self.name, "No runtime to stop abandoned sandbox");
            return;
        };
        let name = std::mem::take(&mut self.name);
        warn!(container = %name, "Sandbox run abandoned, stopping container");
        handle.spawn(async move {
            match tokio::time::timeout(STOP_TIMEOUT, cmd.status()).await {
                Ok(Ok(status)) => debug!(container = %name, %status, "Abandoned sandbox stopped"),
                Ok(Err(e)) => warn!(container = %name, error = %e, "Failed to stop abandoned sandbox"),
                Err(_) => warn!(container = %name, "Stopping abandoned sandbox timed out"),
            }
        });
    }
}
