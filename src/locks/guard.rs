//! RAII handle over a set of claimed GPUs.

use super::store::LockStore;
use crate::error::Result;
use tracing::warn;

/// Handle for the GPUs claimed by one acquisition.
///
/// When dropped, every claimed device is released through the store. This
/// covers normal scope exit, early returns via `?`, and unwinding panics. A
/// process killed outright leaves its records behind; the next acquirer
/// finds the owner dead and overrides them.
///
/// If a release fails during drop, a warning is logged but no panic occurs.
#[derive(Debug)]
#[must_use = "dropping the handle releases the GPUs immediately"]
pub struct GpuLock {
    store: LockStore,

    /// PID recorded as owner in every claimed record.
    owner_pid: u32,

    /// Devices claimed and not yet released, in claim order.
    device_ids: Vec<u32>,
}

impl GpuLock {
    /// Create a handle that holds nothing yet.
    pub(crate) fn empty(store: LockStore, owner_pid: u32) -> Self {
        Self {
            store,
            owner_pid,
            device_ids: Vec::new(),
        }
    }

    /// Record a device claimed on behalf of this handle.
    pub(crate) fn push(&mut self, device_id: u32) {
        self.device_ids.push(device_id);
    }

    /// The claimed GPU indices, in claim order.
    pub fn device_ids(&self) -> &[u32] {
        &self.device_ids
    }

    pub fn len(&self) -> usize {
        self.device_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.device_ids.is_empty()
    }

    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }

    /// The claimed ids joined for `CUDA_VISIBLE_DEVICES`, e.g. `"0,2"`.
    pub fn visible_devices(&self) -> String {
        crate::visibility::visible_devices_value(&self.device_ids)
    }

    /// Manually release every claimed GPU.
    ///
    /// Useful when errors should be handled explicitly instead of logged by
    /// `Drop`. Every device is attempted even if an earlier one fails; the
    /// first failure is returned.
    pub fn release(mut self) -> Result<()> {
        self.release_all()
    }

    /// Release and forget every held device. Running it again is a no-op.
    fn release_all(&mut self) -> Result<()> {
        let mut first_err = None;

        for device_id in std::mem::take(&mut self.device_ids) {
            if let Err(e) = self.store.release(device_id, self.owner_pid)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for GpuLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            warn!(error = %e, "Failed to release GPU lock");
        }
    }
}
