//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for gpulock.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Shared directory holding one record per locked GPU.
    ///
    /// Every participating user must be able to write to it.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    // =========================================================================
    // Device settings
    // =========================================================================
    /// Number of GPUs assumed when the inventory tool is unavailable.
    #[serde(default = "default_system_gpus")]
    pub system_gpus: u32,

    /// Where the GPU inventory comes from.
    #[serde(default)]
    pub inventory: InventorySource,

    /// Path or name of the `nvidia-smi` executable.
    #[serde(default = "default_smi_command")]
    pub smi_command: String,

    /// Seconds a single `nvidia-smi` query may run before it is killed.
    #[serde(default = "default_smi_timeout_secs")]
    pub smi_timeout_secs: u64,

    // =========================================================================
    // Utilization hint
    // =========================================================================
    /// How reported utilization shapes the candidate order.
    #[serde(default)]
    pub utilization_policy: UtilizationPolicy,

    /// GPU load fraction above which a device looks busy.
    #[serde(default = "default_busy_threshold")]
    pub busy_load_threshold: f64,

    /// Memory-in-use fraction above which a device looks busy.
    ///
    /// A device only looks busy when both thresholds are exceeded.
    #[serde(default = "default_busy_threshold")]
    pub busy_memory_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            system_gpus: default_system_gpus(),
            inventory: InventorySource::default(),
            smi_command: default_smi_command(),
            smi_timeout_secs: default_smi_timeout_secs(),
            utilization_policy: UtilizationPolicy::default(),
            busy_load_threshold: default_busy_threshold(),
            busy_memory_threshold: default_busy_threshold(),
        }
    }
}
