/*!
 * Process Module
 * Launching, reaping, detaching and probing OS processes
 */

pub mod cancel;
pub mod detached;
pub mod identity;
pub mod lookup;
pub mod manager;
pub mod reaper;
pub mod types;

// Re-export for convenience
pub use cancel::{CancellationReason, CancellationSource, CancellationToken};
pub use detached::{CompletionRecord, DetachedProcess, COMPLETION_MESSAGE};
pub use identity::{current_pid, parent_pid, raw_getpid};
pub use lookup::{path_exists, resolve_executable};
pub use manager::{is_alive, CancelableProcess, ProcessManager};
pub use reaper::ReaperTask;
pub use types::{ProcessError, ProcessExit, ProcessHandle, ProcessResult};
