//! Error types for gpulock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for gpulock operations.
///
/// Each variant maps to a specific exit code.
#[derive(Error, Debug)]
pub enum GpuLockError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The lock directory or a lock record could not be read or written.
    ///
    /// These are fatal and never retried.
    #[error("lock directory I/O failed: {0}")]
    IoError(String),

    /// A specifically requested GPU is held by another live process.
    #[error("GPU {device_id} is locked by {user} (pid {pid})")]
    Busy {
        device_id: u32,
        user: String,
        pid: u32,
    },

    /// Fewer devices could be claimed than were requested.
    ///
    /// Any partial claims have already been released when this is returned.
    #[error("could not lock {requested} GPU(s): only {claimed} were free, all GPUs are busy")]
    InsufficientDevices { requested: usize, claimed: usize },

    /// An external device tool (e.g. `nvidia-smi`) failed or produced unusable output.
    #[error("device query failed: {0}")]
    ToolError(String),
}

impl GpuLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GpuLockError::UserError(_) => exit_codes::USER_ERROR,
            GpuLockError::IoError(_) => exit_codes::IO_FAILURE,
            GpuLockError::Busy { .. } => exit_codes::LOCK_FAILURE,
            GpuLockError::InsufficientDevices { .. } => exit_codes::LOCK_FAILURE,
            GpuLockError::ToolError(_) => exit_codes::USER_ERROR,
        }
    }

    /// Build an `IoError` naming the path involved.
    pub(crate) fn io(action: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        GpuLockError::IoError(format!("failed to {} '{}': {}", action, path.display(), err))
    }
}

/// Result type alias for gpulock operations.
pub type Result<T> = std::result::Result<T, GpuLockError>;
