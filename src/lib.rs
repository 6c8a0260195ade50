//! gpulock: advisory GPU locking for shared multi-user hosts.
//!
//! Processes that share a machine agree on which GPUs are in use through a
//! directory of small JSON records, without any coordinating daemon. The
//! locks are advisory: they only bind processes that take them.
//!
//! ```no_run
//! use gpulock::config::Config;
//! use gpulock::devices::{DeviceRequest, acquire};
//!
//! let config = Config::resolve(None)?;
//! let lock = acquire(&config, DeviceRequest::Any)?;
//! // ... run work restricted to lock.device_ids() ...
//! drop(lock);
//! # Ok::<(), gpulock::error::GpuLockError>(())
//! ```

pub mod config;
pub mod devices;
pub mod error;
pub mod exit_codes;
pub mod locks;
pub mod visibility;

#[cfg(test)]
mod test_support;

pub use devices::{DeviceRequest, acquire};
pub use error::{GpuLockError, Result};
pub use locks::{GpuLock, LockStore};
