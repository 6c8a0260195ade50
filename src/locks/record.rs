//! On-disk lock record and its JSON codec.

use crate::error::{GpuLockError, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A lock record could not be decoded.
///
/// Never surfaced by the store: a record that fails to decode is treated as
/// stale, since a competitor that crashed mid-write leaves exactly this.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("corrupt lock record: {0}")]
pub struct CorruptRecord(pub String);

/// Lock record stored in `gpu_<id>.json`.
///
/// Field order and key names match the layout other participants write:
/// `{"user": .., "time": .., "id": .., "owner": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Identity of the acquiring principal.
    #[serde(rename = "user")]
    pub owner_user: String,

    /// When the claim was written, in whole seconds since the epoch.
    #[serde(rename = "time", with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,

    /// GPU index this record locks.
    #[serde(rename = "id", alias = "uid")]
    pub device_id: u32,

    /// PID of the acquiring process.
    #[serde(rename = "owner")]
    pub owner_pid: u32,
}

impl LockRecord {
    /// Create a record stamped with the current time.
    pub fn new(device_id: u32, owner_user: &str, owner_pid: u32) -> Self {
        Self {
            owner_user: owner_user.to_string(),
            created_at: Utc::now().trunc_subsecs(0),
            device_id,
            owner_pid,
        }
    }

    /// Serialize to the on-disk representation.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            GpuLockError::IoError(format!("failed to serialize lock record: {}", e))
        })
    }

    /// Parse the on-disk representation.
    ///
    /// Extra keys are ignored; a missing key, a wrong type, or input that is
    /// not JSON at all is a `CorruptRecord`.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, CorruptRecord> {
        serde_json::from_slice(bytes).map_err(|e| CorruptRecord(e.to_string()))
    }

    /// Age of the record relative to now.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}
