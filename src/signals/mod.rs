/*!
 * Signals Module
 * Graceful shutdown on SIGINT/SIGTERM
 */

mod shutdown;
pub mod types;

// Re-export public API
pub use shutdown::ShutdownCoordinator;
pub use types::{ShutdownSignal, SignalError, SignalResult};
