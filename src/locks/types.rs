//! Claim outcomes and lock inspection structures.

use super::record::LockRecord;
use std::path::PathBuf;

/// Outcome of a single `try_claim` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The requester now holds the device.
    Claimed,
    /// Another live process holds the device; nothing was modified.
    Busy(LockRecord),
    /// The record kept disappearing between the exclusive create and the
    /// read, so ownership could not be settled; nothing was modified.
    Contended,
}

impl ClaimResult {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimResult::Claimed)
    }
}

/// State of an existing lock record as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// The recorded owner is alive.
    Held(LockRecord),
    /// The recorded owner is gone; the next acquirer may override it.
    Stale(LockRecord),
    /// The record could not be decoded (or names another device).
    Corrupt(String),
}

impl LockState {
    /// Whether an acquirer would be refused by this record.
    pub fn is_held(&self) -> bool {
        matches!(self, LockState::Held(_))
    }

    pub fn record(&self) -> Option<&LockRecord> {
        match self {
            LockState::Held(record) | LockState::Stale(record) => Some(record),
            LockState::Corrupt(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Held(_) => "held",
            LockState::Stale(_) => "stale",
            LockState::Corrupt(_) => "corrupt",
        }
    }
}

/// Information about a lock record on disk.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The record file path.
    pub path: PathBuf,

    /// GPU index the record belongs to.
    pub device_id: u32,

    /// Classification at the time of the read.
    pub state: LockState,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            LockState::Held(record) | LockState::Stale(record) => write!(
                f,
                "GPU {} (user: {}, pid: {}, age: {}){}",
                self.device_id,
                record.owner_user,
                record.owner_pid,
                record.age_string(),
                if self.state.is_held() { "" } else { ", STALE" }
            ),
            LockState::Corrupt(reason) => {
                write!(f, "GPU {} (CORRUPT: {})", self.device_id, reason)
            }
        }
    }
}
