/*!
 * Process Manager
 * Spawns, waits on, detaches and probes OS processes
 */

use super::cancel::{CancellationReason, CancellationSource, CancellationToken};
use super::detached::{append_completion_record, CompletionRecord, DetachedProcess};
use super::lookup;
use super::reaper::ReaperTask;
use super::types::{ProcessError, ProcessExit, ProcessHandle, ProcessResult};
use crate::core::config::ProcessConfig;
use crate::core::types::Pid;
use dashmap::DashMap;
use nix::sys::signal::kill;
use nix::unistd::Pid as NixPid;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

/// Test whether `pid` names a live process by delivering signal 0
///
/// Never sends a real signal and never escalates: any failure, including
/// ESRCH and EPERM, is `false`. Zombies count as alive until reaped.
pub fn is_alive(pid: Pid) -> bool {
    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        // 0 and negative values address process groups, not a process
        _ => return false,
    };

    match kill(NixPid::from_raw(raw), None) {
        Ok(()) => true,
        Err(errno) => {
            debug!(pid, %errno, "Liveness probe failed");
            false
        }
    }
}

/// A child bound to a cancellation token, reaped in the background
#[derive(Debug)]
pub struct CancelableProcess {
    pid: Pid,
    name: String,
    reaper: ReaperTask<ProcessResult<ProcessHandle>>,
}

impl CancelableProcess {
    /// Valid as soon as the process is spawned
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the child has been reaped
    pub fn is_finished(&self) -> bool {
        self.reaper.is_finished()
    }

    /// Abort the reaper; the child is killed with it
    pub fn abort(&self) {
        self.reaper.abort();
    }

    /// Wait for the child to be reaped
    pub async fn join(self) -> ProcessResult<ProcessHandle> {
        self.reaper.join().await?
    }

    /// Wait for the child to be reaped, giving up after `timeout`
    pub async fn join_timeout(self, timeout: Duration) -> ProcessResult<ProcessHandle> {
        match self.reaper.join_timeout(timeout).await {
            Ok(result) => result,
            Err((err, _)) => Err(err),
        }
    }

    pub fn into_reaper(self) -> ReaperTask<ProcessResult<ProcessHandle>> {
        self.reaper
    }
}

/// Manages OS process execution
pub struct ProcessManager {
    config: ProcessConfig,
    /// In-flight cancelable children, keyed by OS pid
    cancelable: Arc<DashMap<Pid, CancellationSource>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::with_config(ProcessConfig::default())
    }

    pub fn with_config(config: ProcessConfig) -> Self {
        info!(
            detached_log = %config.detached_log_path.display(),
            "Process manager initialized"
        );
        Self {
            config,
            cancelable: Arc::new(DashMap::new()),
        }
    }

    /// Whether `name` resolves to an executable on `PATH`
    pub fn path_exists(&self, name: &str) -> bool {
        lookup::path_exists(name)
    }

    /// Whether `pid` names a live process
    pub fn is_alive(&self, pid: Pid) -> bool {
        is_alive(pid)
    }

    /// Launch a process and wait for it to exit
    ///
    /// The child is reaped before this returns. A non-zero exit is reported
    /// through the handle, not as an error.
    #[instrument(skip(self, args))]
    pub async fn start<I, S>(&self, name: &str, args: I) -> ProcessResult<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = self.command(name, args)?.spawn().map_err(|e| launch_failed(name, e))?;
        let pid = child_pid(&child, name)?;
        debug!(pid, "Spawned OS process");

        let status = child.wait().await.map_err(|e| wait_failed(pid, e))?;
        log_exit(name, pid, &status);
        Ok(ProcessHandle::reaped(pid, name, status))
    }

    /// Launch a process and wait for it as a single step
    ///
    /// Unlike `start`, dropping the returned future before completion kills
    /// the child, so the launch never outlives the call.
    #[instrument(skip(self, args))]
    pub async fn run<I, S>(&self, name: &str, args: I) -> ProcessResult<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(name, args)?;
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| launch_failed(name, e))?;
        let pid = child_pid(&child, name)?;
        let status = child.wait().await.map_err(|e| wait_failed(pid, e))?;
        log_exit(name, pid, &status);
        Ok(ProcessHandle::reaped(pid, name, status))
    }

    /// Launch a process bound to `token` and reap it in the background
    ///
    /// Returns as soon as the child is spawned. When the token is cancelled
    /// or its deadline passes, the child is killed and reaped.
    #[instrument(skip(self, token, args))]
    pub async fn run_cancelable<I, S>(
        &self,
        token: CancellationToken,
        name: &str,
        args: I,
    ) -> ProcessResult<CancelableProcess>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(name, args)?;
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| launch_failed(name, e))?;
        let pid = child_pid(&child, name)?;

        // The entry leaves the registry whenever the reaper future is dropped:
        // on completion, abort or panic
        let shutdown = CancellationSource::new();
        let shutdown_token = shutdown.token();
        self.cancelable.insert(pid, shutdown.clone());
        let entry = RegistryEntry {
            registry: Arc::clone(&self.cancelable),
            pid,
            source: shutdown,
        };

        let owned_name = name.to_string();
        let reaper = ReaperTask::spawn(pid, async move {
            let _entry = entry;
            let result = reap_cancelable(&mut child, pid, &token, &shutdown_token).await;
            result.map(|status| {
                log_exit(&owned_name, pid, &status);
                ProcessHandle::reaped(pid, owned_name, status)
            })
        });

        info!(pid, "Spawned cancelable OS process");
        Ok(CancelableProcess {
            pid,
            name: name.to_string(),
            reaper,
        })
    }

    /// Launch a process in its own process group without waiting for it
    ///
    /// A monitor task reaps the child, waits the configured drain delay and
    /// appends a completion record to the configured log file. Record
    /// failures are logged only.
    #[instrument(skip(self, args))]
    pub async fn start_detached<I, S>(&self, name: &str, args: I) -> ProcessResult<DetachedProcess>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(name, args)?;
        // setpgid(0, 0) in the child: it leads a new group
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| launch_failed(name, e))?;
        let pid = child_pid(&child, name)?;

        let log_path = self.config.detached_log_path.clone();
        let delay = self.config.detached_record_delay;
        let monitor = ReaperTask::spawn(pid, async move {
            let waited = child.wait().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (result, record) = match waited {
                Ok(status) => {
                    let exit = ProcessExit::from_status(pid, &status);
                    (Ok(exit), CompletionRecord::exited(exit))
                }
                Err(e) => {
                    let record = CompletionRecord::failed(pid, e.to_string());
                    (Err(wait_failed(pid, e)), record)
                }
            };

            match append_completion_record(&log_path, &record).await {
                Ok(()) => debug!(pid, path = %log_path.display(), "Completion record written"),
                Err(e) => warn!(
                    pid,
                    path = %log_path.display(),
                    error = %e,
                    "Failed to write completion record"
                ),
            }
            result
        });

        info!(pid, "Spawned detached OS process");
        Ok(DetachedProcess::new(pid, monitor))
    }

    /// Number of cancelable children not yet reaped
    pub fn active_count(&self) -> usize {
        self.cancelable.len()
    }

    /// Cancel every in-flight cancelable child
    ///
    /// Returns how many were signalled; their reapers finish asynchronously.
    pub fn shutdown(&self) -> usize {
        let mut count = 0;
        for entry in self.cancelable.iter() {
            entry.value().cancel(CancellationReason::Shutdown);
            count += 1;
        }
        if count > 0 {
            info!(count, "Cancelling in-flight processes for shutdown");
        }
        count
    }

    fn command<I, S>(&self, name: &str, args: I) -> ProcessResult<Command>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        validate_command(name)?;

        let mut cmd = Command::new(name);
        cmd.args(args).stdin(Stdio::null());
        if self.config.inherit_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        Ok(cmd)
    }
}

impl Clone for ProcessManager {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            cancelable: Arc::clone(&self.cancelable),
        }
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry slot owned by a cancelable child's reaper
struct RegistryEntry {
    registry: Arc<DashMap<Pid, CancellationSource>>,
    pid: Pid,
    source: CancellationSource,
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        // A reused pid may already belong to a newer child
        self.registry
            .remove_if(&self.pid, |_, source| source.same_source(&self.source));
    }
}

async fn reap_cancelable(
    child: &mut Child,
    pid: Pid,
    token: &CancellationToken,
    shutdown: &CancellationToken,
) -> ProcessResult<ExitStatus> {
    let reason = tokio::select! {
        status = child.wait() => return status.map_err(|e| wait_failed(pid, e)),
        reason = token.cancelled() => reason,
        reason = shutdown.cancelled() => reason,
    };

    warn!(pid, ?reason, "Cancelling OS process");
    // Fails only if the child already exited; wait below still reaps it
    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "Kill after cancellation failed");
    }
    child.wait().await.map_err(|e| wait_failed(pid, e))
}

fn validate_command(name: &str) -> ProcessResult<()> {
    if name.trim().is_empty() {
        return Err(ProcessError::InvalidCommand("Empty command".to_string()));
    }
    if name.contains('\0') {
        return Err(ProcessError::InvalidCommand(
            "Command contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

fn child_pid(child: &Child, name: &str) -> ProcessResult<Pid> {
    child.id().ok_or_else(|| ProcessError::LaunchFailed {
        command: name.to_string(),
        reason: "process exited before its pid was read".to_string(),
    })
}

fn launch_failed(name: &str, err: std::io::Error) -> ProcessError {
    warn!(command = name, error = %err, "Failed to spawn OS process");
    ProcessError::LaunchFailed {
        command: name.to_string(),
        reason: err.to_string(),
    }
}

fn wait_failed(pid: Pid, err: std::io::Error) -> ProcessError {
    warn!(pid, error = %err, "Failed to wait for OS process");
    ProcessError::WaitFailed {
        pid,
        reason: err.to_string(),
    }
}

fn log_exit(name: &str, pid: Pid, status: &ExitStatus) {
    info!(command = name, pid, code = ?status.code(), "OS process exited");
}
