//! Shapes of a lock request.

use std::fmt;

/// Which GPUs a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Exactly this GPU, or nothing.
    Single(u32),
    /// Any one GPU.
    Any,
    /// This many GPUs, all or nothing.
    Count(usize),
}

impl DeviceRequest {
    /// Number of GPUs the request needs.
    pub fn wanted(&self) -> usize {
        match self {
            DeviceRequest::Single(_) | DeviceRequest::Any => 1,
            DeviceRequest::Count(n) => *n,
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Single(id) => write!(f, "GPU {}", id),
            DeviceRequest::Any => write!(f, "any GPU"),
            DeviceRequest::Count(n) => write!(f, "{} GPU(s)", n),
        }
    }
}
