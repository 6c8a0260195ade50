//! Candidate ordering and all-or-nothing acquisition.

use super::request::DeviceRequest;
use super::traits::{DeviceInventory, UtilizationMonitor};
use crate::config::UtilizationPolicy;
use crate::error::{GpuLockError, Result};
use crate::locks::{ClaimResult, GpuLock, LockRecord, LockStore, Owner};
use tracing::{debug, info, warn};

/// Chooses which GPUs to try and claims them through a [`LockStore`].
pub struct DeviceSelector<'a> {
    store: &'a LockStore,
    inventory: &'a dyn DeviceInventory,
    monitor: Option<&'a dyn UtilizationMonitor>,
    policy: UtilizationPolicy,
}

impl<'a> DeviceSelector<'a> {
    /// A selector with no utilization hint.
    pub fn new(store: &'a LockStore, inventory: &'a dyn DeviceInventory) -> Self {
        Self {
            store,
            inventory,
            monitor: None,
            policy: UtilizationPolicy::default(),
        }
    }

    /// Bias candidate order with `monitor` according to `policy`.
    pub fn with_monitor(mut self, monitor: &'a dyn UtilizationMonitor, policy: UtilizationPolicy) -> Self {
        self.monitor = Some(monitor);
        self.policy = policy;
        self
    }

    /// The ordered device ids `acquire` will try for `request`.
    ///
    /// A specific GPU is tried alone, without consulting the inventory or
    /// the monitor. Otherwise the inventory is tried in ascending order,
    /// reshaped by the utilization hint when one is configured.
    pub fn candidates(&self, request: &DeviceRequest) -> Result<Vec<u32>> {
        if let DeviceRequest::Single(device_id) = request {
            return Ok(vec![*device_id]);
        }

        let mut ids = self.inventory.device_ids()?;
        ids.sort_unstable();
        ids.dedup();

        Ok(self.apply_hint(ids))
    }

    /// Claim the GPUs `request` asks for on behalf of `owner`.
    ///
    /// Either every requested GPU is claimed, or none is: when too few
    /// candidates can be claimed, the ones already taken in this attempt are
    /// released before the error is returned. If that rollback fails, its
    /// `IoError` is returned instead, since some claims may remain on disk.
    /// There is no waiting or retry.
    pub fn acquire(&self, request: &DeviceRequest, owner: &Owner) -> Result<GpuLock> {
        let wanted = request.wanted();
        if wanted == 0 {
            return Err(GpuLockError::UserError(
                "at least one GPU must be requested".to_string(),
            ));
        }

        let candidates = self.candidates(request)?;
        debug!(request = %request, candidates = ?candidates, "Trying GPUs");

        // Dropping `lock` on an I/O error below rolls back earlier claims.
        let mut lock = GpuLock::empty(self.store.clone(), owner.pid);
        let mut last_busy: Option<LockRecord> = None;

        for device_id in candidates {
            match self.store.try_claim(device_id, &owner.user, owner.pid)? {
                ClaimResult::Claimed => {
                    lock.push(device_id);
                    if lock.len() == wanted {
                        break;
                    }
                }
                ClaimResult::Busy(holder) => last_busy = Some(holder),
                ClaimResult::Contended => {}
            }
        }

        if lock.len() == wanted {
            info!(gpus = ?lock.device_ids(), pid = owner.pid, "Locked GPUs");
            return Ok(lock);
        }

        let claimed = lock.len();
        if let Err(e) = lock.release() {
            warn!(error = %e, "Failed to roll back partial GPU claims");
            return Err(match e {
                GpuLockError::IoError(msg) => GpuLockError::IoError(format!(
                    "could not roll back {} partial GPU claim(s): {}",
                    claimed, msg
                )),
                other => other,
            });
        }

        match (request, last_busy) {
            (DeviceRequest::Single(_), Some(holder)) => Err(GpuLockError::Busy {
                device_id: holder.device_id,
                user: holder.owner_user,
                pid: holder.owner_pid,
            }),
            _ => Err(GpuLockError::InsufficientDevices {
                requested: wanted,
                claimed,
            }),
        }
    }

    /// Reorder or filter `ids` using the utilization monitor.
    fn apply_hint(&self, ids: Vec<u32>) -> Vec<u32> {
        let Some(monitor) = self.monitor else {
            return ids;
        };
        if self.policy == UtilizationPolicy::Ignore {
            return ids;
        }

        let busy = match monitor.busy_devices() {
            Ok(busy) => busy,
            Err(e) => {
                warn!(error = %e, "GPU utilization query failed; trying GPUs in index order");
                return ids;
            }
        };
        if !busy.is_empty() {
            debug!(busy = ?busy, "GPUs reported busy by utilization query");
        }

        let (mut idle, busy_ids): (Vec<u32>, Vec<u32>) =
            ids.into_iter().partition(|id| !busy.contains(id));

        if self.policy == UtilizationPolicy::PreferIdle {
            idle.extend(busy_ids);
        }
        idle
    }
}
