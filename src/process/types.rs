/*!
 * Process Types
 * Common types for process management
 */

use crate::core::types::Pid;
use crate::syscalls::ErrorKind;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use thiserror::Error;

/// Process operation result
///
/// # Must Use
/// Process operations can fail and must be handled to prevent leaked children
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ProcessError {
    #[error("Invalid command: {0}")]
    #[diagnostic(
        code(process::invalid_command),
        help("Pass a non-empty executable name without NUL bytes.")
    )]
    InvalidCommand(String),

    #[error("Failed to launch '{command}': {reason}")]
    #[diagnostic(
        code(process::launch_failed),
        help("Check that the executable exists on PATH and is executable.")
    )]
    LaunchFailed { command: String, reason: String },

    #[error("Failed to wait for process {pid}: {reason}")]
    #[diagnostic(
        code(process::wait_failed),
        help("The child may already have been reaped elsewhere.")
    )]
    WaitFailed { pid: Pid, reason: String },

    #[error("Reaper task for process {pid} failed: {reason}")]
    #[diagnostic(code(process::reaper_failed))]
    ReaperFailed { pid: Pid, reason: String },

    #[error("Timed out after {elapsed_ms}ms waiting for process {pid}")]
    #[diagnostic(
        code(process::timeout),
        help("The process is still running; join again or cancel it.")
    )]
    Timeout { pid: Pid, elapsed_ms: u64 },
}

impl ProcessError {
    /// Position of this error in the shared error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::InvalidCommand(_) => ErrorKind::Configuration,
            ProcessError::LaunchFailed { .. } | ProcessError::WaitFailed { .. } => {
                ErrorKind::FatalLaunchFailure
            }
            ProcessError::ReaperFailed { .. } => ErrorKind::Other,
            ProcessError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Serializable summary of a reaped child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessExit {
    pub pid: Pid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub success: bool,
}

impl ProcessExit {
    pub fn from_status(pid: Pid, status: &ExitStatus) -> Self {
        Self {
            pid,
            code: status.code(),
            signal: status.signal(),
            success: status.success(),
        }
    }
}

/// Handle to a launched OS process
///
/// Handles returned by `start`/`run` are already reaped; they carry the final
/// status and offer no further wait.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Pid,
    name: String,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    pub(crate) fn reaped(pid: Pid, name: impl Into<String>, status: ExitStatus) -> Self {
        Self {
            pid,
            name: name.into(),
            status: Some(status),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    #[inline]
    pub fn is_reaped(&self) -> bool {
        self.status.is_some()
    }

    /// Exit code, `None` if unreaped or killed by a signal
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Signal that terminated the process, if any
    pub fn signal(&self) -> Option<i32> {
        self.status.and_then(|s| s.signal())
    }

    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn to_exit(&self) -> Option<ProcessExit> {
        self.status
            .as_ref()
            .map(|s| ProcessExit::from_status(self.pid, s))
    }
}
