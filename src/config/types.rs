//! Configuration types and defaults for gpulock.
//!
//! This module defines enums and default value functions used by the
//! Config struct.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the list of GPUs on the host comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    /// Ask `nvidia-smi`, falling back to `0..system_gpus` if it fails (default).
    #[default]
    Auto,
    /// Always use `0..system_gpus`.
    Fixed,
}

/// How the utilization hint shapes the candidate order for "any" requests.
///
/// The hint never decides a claim on its own; the lock records do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationPolicy {
    /// Try idle GPUs first, busy ones last (default).
    #[default]
    PreferIdle,
    /// Do not try GPUs that look busy.
    SkipBusy,
    /// Do not query utilization at all.
    Ignore,
}

// Default value functions for serde
pub(crate) fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/tmp/gpu_lock")
}
pub(crate) fn default_system_gpus() -> u32 {
    8
}
pub(crate) fn default_busy_threshold() -> f64 {
    0.1
}
pub(crate) fn default_smi_command() -> String {
    "nvidia-smi".to_string()
}
pub(crate) fn default_smi_timeout_secs() -> u64 {
    10
}
