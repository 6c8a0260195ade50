//! Collaborator interfaces consumed by the device selector.

use crate::error::Result;
use std::collections::BTreeSet;

/// Source of the GPU indices that exist on this host.
pub trait DeviceInventory {
    /// All valid device indices, in any order.
    fn device_ids(&self) -> Result<Vec<u32>>;
}

/// Best-effort report of GPUs that look busy right now.
///
/// Used only to order candidates. A failing or absent monitor must never stop
/// a lock from being taken.
pub trait UtilizationMonitor {
    /// Indices of devices that currently appear to be in use.
    fn busy_devices(&self) -> Result<BTreeSet<u32>>;
}
