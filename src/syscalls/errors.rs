/*!
 * Socket Error Types
 * Error taxonomy and OS error classification for raw socket calls
 */

use super::socket::SocketState;
use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::io;
use std::os::fd::RawFd;
use thiserror::Error;
use tracing::debug;

/// Socket operation result
pub type SocketResult<T> = Result<T, SocketError>;

/// Coarse error categories used to drive retry and teardown decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Executable or process lookup failed
    NotFound,
    /// The OS refused or ran out of resources (fd limits, address in use)
    OsRejection,
    /// Invalid input to a setup call
    Configuration,
    /// Would block / interrupted; retry with backoff
    TransientIo,
    /// Connection reset by the remote peer
    PeerReset,
    /// Write to a connection the peer already closed
    BrokenPipe,
    /// Descriptor already closed on this side
    ClosedLocally,
    /// Operation exceeded a deadline
    Timeout,
    /// Process spawn or wait failed
    FatalLaunchFailure,
    Other,
}

impl ErrorKind {
    /// Worth retrying the same call later
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientIo)
    }

    /// Ends one connection without affecting other descriptors
    pub fn is_connection_scoped(self) -> bool {
        matches!(
            self,
            ErrorKind::PeerReset | ErrorKind::BrokenPipe | ErrorKind::Timeout
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "resource not found",
            ErrorKind::OsRejection => "rejected by the operating system",
            ErrorKind::Configuration => "invalid configuration",
            ErrorKind::TransientIo => "operation would block, retry later",
            ErrorKind::PeerReset => "connection reset by peer",
            ErrorKind::BrokenPipe => "broken pipe",
            ErrorKind::ClosedLocally => "connection closed locally",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::FatalLaunchFailure => "process launch failed",
            ErrorKind::Other => "unclassified error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Map an OS error code onto the taxonomy
pub fn classify(errno: Errno) -> ErrorKind {
    let kind = match errno {
        Errno::EBADF => ErrorKind::ClosedLocally,
        Errno::ECONNRESET => ErrorKind::PeerReset,
        Errno::EPIPE => ErrorKind::BrokenPipe,
        // EWOULDBLOCK is an alias of EAGAIN on Linux
        Errno::EAGAIN | Errno::EINTR | Errno::EINPROGRESS | Errno::EALREADY => {
            ErrorKind::TransientIo
        }
        Errno::ETIMEDOUT => ErrorKind::Timeout,
        Errno::ENOENT | Errno::ESRCH => ErrorKind::NotFound,
        Errno::EADDRINUSE
        | Errno::EADDRNOTAVAIL
        | Errno::EACCES
        | Errno::EPERM
        | Errno::EMFILE
        | Errno::ENFILE
        | Errno::ENOBUFS
        | Errno::ENOMEM
        | Errno::EAFNOSUPPORT
        | Errno::EPROTONOSUPPORT
        | Errno::ECONNREFUSED => ErrorKind::OsRejection,
        Errno::EINVAL | Errno::ENOTSOCK | Errno::EOPNOTSUPP | Errno::ENOTCONN => {
            ErrorKind::Configuration
        }
        _ => ErrorKind::Other,
    };
    debug!(%errno, ?kind, "{}", kind.describe());
    kind
}

/// Classify a std I/O error, preferring its raw OS code
pub fn classify_io(err: &io::Error) -> ErrorKind {
    if let Some(code) = err.raw_os_error() {
        return classify(Errno::from_raw(code));
    }
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => ErrorKind::TransientIo,
        io::ErrorKind::ConnectionReset => ErrorKind::PeerReset,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        io::ErrorKind::TimedOut => ErrorKind::Timeout,
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied => ErrorKind::OsRejection,
        io::ErrorKind::InvalidInput => ErrorKind::Configuration,
        _ => ErrorKind::Other,
    }
}

/// Raw socket errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SocketError {
    #[error("Invalid IPv4 address: {0:?}")]
    #[diagnostic(
        code(socket::invalid_address),
        help("Use dotted-quad notation such as 127.0.0.1.")
    )]
    InvalidAddress(String),

    #[error("Cannot {op} a socket in state {state:?}")]
    #[diagnostic(
        code(socket::invalid_state),
        help("Sockets go create -> configure -> bind -> listen, in that order.")
    )]
    InvalidState { op: &'static str, state: SocketState },

    #[error("Read buffer size is zero")]
    #[diagnostic(
        code(socket::zero_read_buffer),
        help("Configure a read_buffer_size of at least 1 byte.")
    )]
    ZeroReadBuffer,

    #[error("{op} failed on fd {fd}: {errno}")]
    #[diagnostic(code(socket::os_error))]
    Os {
        op: &'static str,
        fd: RawFd,
        errno: Errno,
    },
}

impl SocketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SocketError::InvalidAddress(_)
            | SocketError::InvalidState { .. }
            | SocketError::ZeroReadBuffer => ErrorKind::Configuration,
            SocketError::Os { errno, .. } => classify(*errno),
        }
    }

    pub fn errno(&self) -> Option<Errno> {
        match self {
            SocketError::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
