/*!
 * Raw Sockets
 *
 * IPv4 stream sockets driven through socket/setsockopt/bind/listen/read/write
 * directly, exposing the knobs a high-level listener hides: backlog depth,
 * non-blocking mode and address reuse.
 */

use super::errors::{SocketError, SocketResult};
use crate::core::config::SocketConfig;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::socket::{
    accept, bind, getsockname, listen, setsockopt, socket, socketpair, sockopt, AddressFamily,
    Backlog, SockFlag, SockType, SockaddrIn,
};
use nix::unistd::{close, read, write};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a socket descriptor. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SocketState {
    Created,
    Configured,
    Bound,
    Listening,
    /// Accepted from a listener or created as a connected pair
    Connected,
}

/// An owned OS socket and its lifecycle state
///
/// Closing consumes the descriptor; dropping it also releases the fd.
#[derive(Debug)]
pub struct SocketDescriptor {
    fd: OwnedFd,
    state: SocketState,
    non_blocking: bool,
}

impl SocketDescriptor {
    fn new(fd: OwnedFd, state: SocketState) -> Self {
        Self {
            fd,
            state,
            non_blocking: false,
        }
    }

    #[inline]
    pub fn state(&self) -> SocketState {
        self.state
    }

    #[inline]
    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    fn require(&self, op: &'static str, allowed: &[SocketState]) -> SocketResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        warn!(fd = self.as_raw_fd(), op, state = ?self.state, "Socket call out of order");
        Err(SocketError::InvalidState {
            op,
            state: self.state,
        })
    }
}

impl AsFd for SocketDescriptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for SocketDescriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Raw socket operations parameterised by backlog and read size
#[derive(Debug, Clone, Default)]
pub struct SocketManager {
    config: SocketConfig,
}

impl SocketManager {
    pub fn new() -> Self {
        Self::with_config(SocketConfig::default())
    }

    pub fn with_config(config: SocketConfig) -> Self {
        debug!(
            backlog = config.backlog,
            read_buffer_size = config.read_buffer_size,
            "Socket manager initialized"
        );
        Self { config }
    }

    /// socket(AF_INET, SOCK_STREAM, 0)
    #[instrument(skip(self))]
    pub fn create_socket(&self) -> SocketResult<SocketDescriptor> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Stream,
            SockFlag::empty(),
            None,
        )
        .map_err(|errno| os_error("socket", -1, errno))?;

        debug!(fd = fd.as_raw_fd(), "Created IPv4 stream socket");
        Ok(SocketDescriptor::new(fd, SocketState::Created))
    }

    /// Release the OS resource
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn close(&self, desc: SocketDescriptor) -> SocketResult<()> {
        let raw = desc.fd.into_raw_fd();
        close(raw).map_err(|errno| os_error("close", raw, errno))?;
        debug!("Closed socket");
        Ok(())
    }

    /// SO_REUSEADDR, so a restart can rebind a port still in TIME_WAIT
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn set_reuse_address(&self, desc: &mut SocketDescriptor) -> SocketResult<()> {
        desc.require("set SO_REUSEADDR on", &[SocketState::Created, SocketState::Configured])?;

        setsockopt(&desc.fd, sockopt::ReuseAddr, &true)
            .map_err(|errno| os_error("setsockopt", desc.as_raw_fd(), errno))?;
        desc.state = SocketState::Configured;
        Ok(())
    }

    /// O_NONBLOCK: read/write/accept return EAGAIN instead of waiting
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn set_non_blocking(&self, desc: &mut SocketDescriptor) -> SocketResult<()> {
        let raw = desc.as_raw_fd();
        let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(|errno| os_error("fcntl", raw, errno))?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(|errno| os_error("fcntl", raw, errno))?;

        desc.non_blocking = true;
        if desc.state == SocketState::Created {
            desc.state = SocketState::Configured;
        }
        Ok(())
    }

    /// Validate `ip` as dotted IPv4, then bind to `ip:port`
    ///
    /// Malformed addresses are rejected before bind(2) is attempted.
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn bind(&self, desc: &mut SocketDescriptor, ip: &str, port: u16) -> SocketResult<()> {
        desc.require("bind", &[SocketState::Created, SocketState::Configured])?;

        let addr = parse_ipv4(ip)?;
        let sockaddr = SockaddrIn::from(SocketAddrV4::new(addr, port));
        bind(desc.as_raw_fd(), &sockaddr)
            .map_err(|errno| os_error("bind", desc.as_raw_fd(), errno))?;

        desc.state = SocketState::Bound;
        info!(%addr, port, "Socket bound");
        Ok(())
    }

    /// Start accepting connections with the configured backlog
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn listen(&self, desc: &mut SocketDescriptor) -> SocketResult<()> {
        desc.require("listen on", &[SocketState::Bound])?;

        let raw = desc.as_raw_fd();
        let backlog =
            Backlog::new(self.config.backlog).map_err(|errno| os_error("listen", raw, errno))?;
        listen(&desc.fd, backlog).map_err(|errno| os_error("listen", raw, errno))?;

        desc.state = SocketState::Listening;
        info!(backlog = self.config.backlog, "Socket listening");
        Ok(())
    }

    /// Accept one pending connection
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn accept(&self, desc: &SocketDescriptor) -> SocketResult<SocketDescriptor> {
        desc.require("accept on", &[SocketState::Listening])?;

        let raw = desc.as_raw_fd();
        let conn = accept(raw).map_err(|errno| os_error("accept", raw, errno))?;
        // SAFETY: accept(2) just returned this fd and nothing else owns it
        let conn = unsafe { OwnedFd::from_raw_fd(conn) };

        debug!(conn_fd = conn.as_raw_fd(), "Accepted connection");
        Ok(SocketDescriptor::new(conn, SocketState::Connected))
    }

    /// Address the socket is bound to; reveals the port picked for port 0
    pub fn local_addr(&self, desc: &SocketDescriptor) -> SocketResult<SocketAddrV4> {
        let raw = desc.as_raw_fd();
        let addr: SockaddrIn =
            getsockname(raw).map_err(|errno| os_error("getsockname", raw, errno))?;
        Ok(SocketAddrV4::from(addr))
    }

    /// A connected pair of local stream sockets
    pub fn pair(&self) -> SocketResult<(SocketDescriptor, SocketDescriptor)> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )
        .map_err(|errno| os_error("socketpair", -1, errno))?;

        Ok((
            SocketDescriptor::new(a, SocketState::Connected),
            SocketDescriptor::new(b, SocketState::Connected),
        ))
    }

    /// One read(2) of at most `read_buffer_size` bytes
    ///
    /// Returns exactly the bytes read; empty means the peer closed. Larger
    /// messages need repeated calls.
    #[instrument(skip(self, desc), fields(fd = desc.as_raw_fd()))]
    pub fn read(&self, desc: &SocketDescriptor) -> SocketResult<Vec<u8>> {
        desc.require("read from", &[SocketState::Connected])?;
        // A zero-length read(2) returns 0, indistinguishable from EOF
        if self.config.read_buffer_size == 0 {
            warn!("Refusing read with a zero-sized buffer");
            return Err(SocketError::ZeroReadBuffer);
        }

        let raw = desc.as_raw_fd();
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let n = read(raw, &mut buf).map_err(|errno| os_error("read", raw, errno))?;
        buf.truncate(n);

        debug!(bytes = n, "Read from socket");
        Ok(buf)
    }

    /// One write(2) attempt; a short count leaves the remainder to the caller
    #[instrument(skip(self, desc, data), fields(fd = desc.as_raw_fd(), len = data.len()))]
    pub fn write(&self, desc: &SocketDescriptor, data: &[u8]) -> SocketResult<usize> {
        desc.require("write to", &[SocketState::Connected])?;

        let n = write(&desc.fd, data).map_err(|errno| os_error("write", desc.as_raw_fd(), errno))?;
        debug!(bytes = n, "Wrote to socket");
        Ok(n)
    }
}

/// Strict dotted-quad IPv4 parsing
pub fn parse_ipv4(ip: &str) -> SocketResult<Ipv4Addr> {
    ip.parse::<Ipv4Addr>().map_err(|_| {
        warn!(ip, "Invalid IPv4 address");
        SocketError::InvalidAddress(ip.to_string())
    })
}

fn os_error(op: &'static str, fd: RawFd, errno: Errno) -> SocketError {
    let err = SocketError::Os { op, fd, errno };
    // TransientIo is routine on non-blocking descriptors
    if err.is_retryable() {
        debug!(op, fd, %errno, "Socket call would block");
    } else {
        warn!(op, fd, %errno, kind = %err.kind(), "Socket call failed");
    }
    err
}
