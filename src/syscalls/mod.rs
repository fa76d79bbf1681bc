/*!
 * Syscalls Module
 * Raw socket system calls and OS error classification
 */

mod errors;
mod socket;

// Re-export public API
pub use errors::{classify, classify_io, ErrorKind, SocketError, SocketResult};
pub use socket::{parse_ipv4, SocketDescriptor, SocketManager, SocketState};
