/*!
 * Signal Types
 * Shutdown signal definitions and result types
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, SignalError>;

/// Signal errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SignalError {
    #[error("Signal handlers need a running Tokio runtime")]
    #[diagnostic(
        code(signals::no_runtime),
        help("Call install() from inside #[tokio::main] or a runtime context.")
    )]
    NoRuntime,

    #[error("Failed to register handler for {signal}: {reason}")]
    #[diagnostic(code(signals::registration_failed))]
    RegistrationFailed {
        signal: ShutdownSignal,
        reason: String,
    },
}

/// Signals that request a graceful shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownSignal {
    /// SIGINT, interrupt from keyboard (Ctrl+C)
    Interrupt,
    /// SIGTERM, polite termination request
    Terminate,
}

impl ShutdownSignal {
    /// Raw signal number
    pub fn number(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => nix::libc::SIGINT,
            ShutdownSignal::Terminate => nix::libc::SIGTERM,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
