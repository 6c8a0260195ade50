//! Configuration model for gpulock.
//!
//! This module defines the Config struct that is read from an optional YAML
//! file. It supports forward-compatible parsing (unknown fields are ignored),
//! sensible defaults for every field, environment overrides, and validation
//! of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::{CONFIG_ENV, LOCK_DIR_ENV};
pub use types::{InventorySource, UtilizationPolicy};
