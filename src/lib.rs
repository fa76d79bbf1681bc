/*!
 * procnet Library
 * OS process control and raw socket plumbing exposed as a library
 */

pub mod core;
pub mod monitoring;
pub mod process;
pub mod signals;
pub mod syscalls;

// Re-exports
pub use core::{Config, Error, Pid, ProcessConfig, Result, SocketConfig};
pub use monitoring::init_tracing;
pub use process::{
    CancelableProcess, CancellationReason, CancellationSource, CancellationToken,
    DetachedProcess, ProcessError, ProcessHandle, ProcessManager,
};
pub use signals::{ShutdownCoordinator, ShutdownSignal};
pub use syscalls::{ErrorKind, SocketDescriptor, SocketError, SocketManager, SocketState};
