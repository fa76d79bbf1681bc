/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

pub use crate::core::config::ConfigError;
pub use crate::process::ProcessError;
pub use crate::signals::SignalError;
pub use crate::syscalls::SocketError;

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Socket error: {0}")]
    #[diagnostic(transparent)]
    Socket(#[from] SocketError),

    #[error("Signal error: {0}")]
    #[diagnostic(transparent)]
    Signal(#[from] SignalError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(procnet::io_error),
        help("Filesystem or I/O operation failed. Check file permissions and disk space.")
    )]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;
