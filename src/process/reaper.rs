/*!
 * Reaper Tasks
 *
 * Supervised background tasks that collect a child's exit status. The
 * owner can poll, join (optionally with a timeout) or abort them; dropping
 * the handle leaves the task running.
 */

use super::types::{ProcessError, ProcessResult};
use crate::core::types::Pid;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ReaperTask<T: Send + 'static> {
    pid: Pid,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ReaperTask<T> {
    /// Spawn a reaper for `pid` on the current runtime
    pub fn spawn<F>(pid: Pid, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            pid,
            handle: tokio::spawn(future),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the reaper. Children spawned with kill-on-drop die with it.
    pub fn abort(&self) {
        debug!(pid = self.pid, "Aborting reaper task");
        self.handle.abort();
    }

    /// Wait for the reaper to finish
    pub async fn join(self) -> ProcessResult<T> {
        let pid = self.pid;
        self.handle.await.map_err(|e| ProcessError::ReaperFailed {
            pid,
            reason: e.to_string(),
        })
    }

    /// Wait for the reaper with an upper bound
    ///
    /// On timeout the reaper keeps running and is handed back alongside the
    /// error so the caller can join again or abort.
    pub async fn join_timeout(self, timeout: Duration) -> Result<T, (ProcessError, Option<Self>)> {
        let pid = self.pid;
        let start = Instant::now();
        let mut handle = self.handle;

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err((
                ProcessError::ReaperFailed {
                    pid,
                    reason: e.to_string(),
                },
                None,
            )),
            Err(_) => Err((
                ProcessError::Timeout {
                    pid,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                },
                Some(Self { pid, handle }),
            )),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for ReaperTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaperTask")
            .field("pid", &self.pid)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
