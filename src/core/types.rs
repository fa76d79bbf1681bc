/*!
 * Core Types
 * Common types used across the crate
 */

/// Process ID type
pub type Pid = u32;

/// Default listen backlog (pending, not yet accepted connections)
pub const DEFAULT_BACKLOG: i32 = 5;

/// Default capacity of a single socket read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default file receiving detached-process completion records
pub const DEFAULT_DETACHED_LOG: &str = "logs.txt";
