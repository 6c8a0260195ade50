//! Device selection for gpulock.
//!
//! Turns a request for one specific GPU, any GPU, or N GPUs into an ordered
//! list of candidates and claims them through the lock store:
//! - The inventory (`nvidia-smi`, or a configured count) says which GPUs exist
//! - The optional utilization monitor moves GPUs that look busy to the back,
//!   or drops them, but never decides a claim
//! - Candidates are tried in order until enough are claimed; a short
//!   acquisition is rolled back completely

mod inventory;
mod request;
mod selector;
pub mod smi;
mod traits;


// Re-export public API
pub use inventory::{FixedInventory, SystemInventory};
pub use request::DeviceRequest;
pub use selector::DeviceSelector;
pub use smi::{DeviceUsage, SmiTool};
pub use traits::{DeviceInventory, UtilizationMonitor};

use crate::config::Config;
use crate::error::Result;
use crate::locks::{GpuLock, LockStore, Owner};

/// Lock GPUs for the current process using `config`.
///
/// This is the library entry point: it opens the configured lock directory,
/// uses the host inventory and `nvidia-smi` utilization hint, and returns a
/// handle that releases the GPUs when dropped.
///
/// ```no_run
/// use gpulock::config::Config;
/// use gpulock::devices::{DeviceRequest, acquire};
///
/// let config = Config::resolve(None)?;
/// let lock = acquire(&config, DeviceRequest::Count(2))?;
/// println!("CUDA_VISIBLE_DEVICES={}", lock.visible_devices());
/// # Ok::<(), gpulock::error::GpuLockError>(())
/// ```
pub fn acquire(config: &Config, request: DeviceRequest) -> Result<GpuLock> {
    let store = LockStore::open(&config.lock_dir)?;
    let inventory = SystemInventory::from_config(config);
    let smi = SmiTool::from_config(config);

    DeviceSelector::new(&store, &inventory)
        .with_monitor(&smi, config.utilization_policy)
        .acquire(&request, &Owner::current())
}
