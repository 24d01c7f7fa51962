//! Sandbox runner trait and implementations.
//!
//! The container image does the actual grading; runners only launch it with
//! the right limits and mounts, capture what it prints, and make sure it is
//! gone when the call returns.

mod docker;
pub mod invocation;

pub use docker::DockerRunner;
pub use invocation::{
    selection_filter, AccessMode, Mount, NetworkMode, ResourceLimits, RootFs, SandboxConfig,
    SandboxInvocationBuilder,
};

use async_trait::async_trait;

use crate::error::SandboxError;

/// Exit code reported when the wall-clock limit killed the sandbox.
pub const TIMEOUT_EXIT_CODE: i32 = -2;

/// Exit code reported when the sandbox exceeded the output capture cap.
pub const OUTPUT_LIMIT_EXIT_CODE: i32 = -3;

/// How a sandbox run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The runtime exited on its own. `-1` if it was killed by a signal.
    Exited(i32),
    /// Killed after the wall-clock limit.
    TimedOut,
    /// Killed after a stream exceeded the capture cap.
    OutputLimitExceeded,
}

/// Result of a single sandbox run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExitStatus,
    /// Captured stdout, lossily decoded, at most the capture cap.
    pub stdout: String,
    /// Captured stderr, lossily decoded, at most the capture cap.
    pub stderr: String,
}

impl ExecutionResult {
    /// Exit code with the timeout and output-limit sentinels folded in.
    pub const fn exit_code(&self) -> i32 {
        match self.status {
            ExitStatus::Exited(code) => code,
            ExitStatus::TimedOut => TIMEOUT_EXIT_CODE,
            ExitStatus::OutputLimitExceeded => OUTPUT_LIMIT_EXIT_CODE,
        }
    }

    pub const fn succeeded(&self) -> bool {
        matches!(self.status, ExitStatus::Exited(0))
    }
}

/// Something that can execute a [`SandboxConfig`].
///
/// Implementations must not retry, and must leave no sandbox running once
/// `run` returns or its future is dropped.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(&self, config: &SandboxConfig) -> Result<ExecutionResult, SandboxError>;
}
