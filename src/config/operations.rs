//! Config loading, validation, and environment overrides.

use super::model::Config;
use crate::error::{GpuLockError, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "GPULOCK_CONFIG";

/// Environment variable overriding `lock_dir`.
pub const LOCK_DIR_ENV: &str = "GPULOCK_DIR";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            GpuLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// A blank document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| GpuLockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration for this process.
    ///
    /// Precedence:
    /// 1. `explicit` path (from `--config`), else `$GPULOCK_CONFIG`, else defaults
    /// 2. `$GPULOCK_DIR`, when set and non-empty, replaces `lock_dir`
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os(LOCK_DIR_ENV)
            && !dir.is_empty()
        {
            config.lock_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_dir` and `smi_command` must be non-empty
    /// - `system_gpus` and `smi_timeout_secs` must be positive
    /// - both busy thresholds must lie in `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.lock_dir.as_os_str().is_empty() {
            return Err(GpuLockError::UserError(
                "config validation failed: lock_dir must not be empty".to_string(),
            ));
        }

        if self.smi_command.trim().is_empty() {
            return Err(GpuLockError::UserError(
                "config validation failed: smi_command must not be empty".to_string(),
            ));
        }

        if self.smi_timeout_secs == 0 {
            return Err(GpuLockError::UserError(
                "config validation failed: smi_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.system_gpus == 0 {
            return Err(GpuLockError::UserError(
                "config validation failed: system_gpus must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("busy_load_threshold", self.busy_load_threshold),
            ("busy_memory_threshold", self.busy_memory_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GpuLockError::UserError(format!(
                    "config validation failed: {} must be between 0 and 1 (found {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
