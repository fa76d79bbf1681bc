/*!
 * Detached Processes
 *
 * Children moved into their own process group so interrupts aimed at the
 * launcher's group do not reach them. A monitor task reaps the child and
 * appends a completion record once it has exited.
 */

use super::reaper::ReaperTask;
use super::types::{ProcessExit, ProcessResult};
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Message written when a detached child was reaped
pub const COMPLETION_MESSAGE: &str = "successfully closed child process";

/// Message written when reaping a detached child failed
pub const FAILURE_MESSAGE: &str = "failed to reap child process";

/// One line of the completion log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompletionRecord {
    pub message: String,
    pub pid: Pid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ProcessExit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at_ms: u64,
}

impl CompletionRecord {
    pub fn exited(exit: ProcessExit) -> Self {
        Self {
            message: COMPLETION_MESSAGE.to_string(),
            pid: exit.pid,
            exit: Some(exit),
            error: None,
            recorded_at_ms: now_millis(),
        }
    }

    pub fn failed(pid: Pid, error: impl Into<String>) -> Self {
        Self {
            message: FAILURE_MESSAGE.to_string(),
            pid,
            exit: None,
            error: Some(error.into()),
            recorded_at_ms: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append `record` as one JSON line to `path`, creating the file if needed
pub async fn append_completion_record(path: &Path, record: &CompletionRecord) -> io::Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}

/// A child running in its own process group
///
/// The launcher keeps only a non-blocking monitor; there is no synchronous
/// join.
#[derive(Debug)]
pub struct DetachedProcess {
    pid: Pid,
    monitor: ReaperTask<ProcessResult<ProcessExit>>,
}

impl DetachedProcess {
    pub(crate) fn new(pid: Pid, monitor: ReaperTask<ProcessResult<ProcessExit>>) -> Self {
        Self { pid, monitor }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Process group of the child; it leads its own group
    #[inline]
    pub fn pgid(&self) -> Pid {
        self.pid
    }

    /// Whether the child has been reaped and its record written
    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Give up the handle, keeping the monitor
    pub fn into_monitor(self) -> ReaperTask<ProcessResult<ProcessExit>> {
        self.monitor
    }
}
