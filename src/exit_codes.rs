//! Exit code constants for the gpulock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config, refused clear, tool failure)
//! - 2: Lock directory I/O failure
//! - 3: Lock acquisition failure (busy device, not enough free devices)
//!
//! `gpulock run` exits with the child's own exit code once the child has
//! started; these codes only apply to failures before that point.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or a failing external tool.
pub const USER_ERROR: i32 = 1;

/// The lock directory or a record file could not be read or written.
pub const IO_FAILURE: i32 = 2;

/// Lock acquisition failure: the requested devices are held by live processes.
pub const LOCK_FAILURE: i32 = 3;
