/*!
 * Process Identity
 * Identifiers of the calling process
 */

use crate::core::types::Pid;
use nix::errno::Errno;
use nix::unistd::{getpid, getppid};

/// PID of the calling process
pub fn current_pid() -> Pid {
    getpid().as_raw() as Pid
}

/// PID of the calling process's parent
pub fn parent_pid() -> Pid {
    getppid().as_raw() as Pid
}

/// PID of the calling process, read through the raw `getpid` syscall
/// instead of the libc wrapper
pub fn raw_getpid() -> Result<Pid, Errno> {
    // SAFETY: SYS_getpid takes no arguments and touches no memory
    let ret = unsafe { nix::libc::syscall(nix::libc::SYS_getpid) };
    if ret < 0 {
        return Err(Errno::last());
    }
    Ok(ret as Pid)
}
