//! Implementation of the `gpulock devices` command.
//!
//! Shows every GPU in the inventory with its current utilization (when
//! `nvidia-smi` answers) and its lock state.

use gpulock::config::Config;
use gpulock::devices::{DeviceInventory, DeviceUsage, SmiTool, SystemInventory};
use gpulock::error::Result;
use gpulock::exit_codes::SUCCESS;
use gpulock::locks::{LockInfo, LockState, LockStore};
use std::fmt::Write as _;
use tracing::warn;

/// One line of the device table.
struct DeviceRow {
    device_id: u32,
    usage: Option<DeviceUsage>,
    busy: bool,
    lock: Option<LockInfo>,
}

/// Execute the `gpulock devices` command.
pub fn cmd_devices(config: &Config) -> Result<i32> {
    let mut ids = SystemInventory::from_config(config).device_ids()?;
    ids.sort_unstable();
    ids.dedup();

    let smi = SmiTool::from_config(config);
    let usage = match smi.usage() {
        Ok(usage) => usage,
        Err(e) => {
            warn!(error = %e, "GPU utilization query failed");
            Vec::new()
        }
    };

    let store = LockStore::new(&config.lock_dir);
    let mut rows = Vec::with_capacity(ids.len());
    for device_id in ids {
        let usage = usage.iter().find(|u| u.index == device_id).cloned();
        let busy = usage.as_ref().is_some_and(|u| smi.looks_busy(u));
        rows.push(DeviceRow {
            device_id,
            usage,
            busy,
            lock: store.inspect(device_id)?,
        });
    }

    print!("{}", render_devices(&rows));
    Ok(SUCCESS)
}

fn render_devices(rows: &[DeviceRow]) -> String {
    let mut out = String::new();

    if rows.is_empty() {
        let _ = writeln!(out, "No GPUs found.");
        return out;
    }

    let _ = writeln!(
        out,
        "  {:>4}  {:>5}  {:>5}  {:5}  {}",
        "GPU", "LOAD", "MEM", "HINT", "LOCK"
    );
    for row in rows {
        let (load, memory) = match &row.usage {
            Some(u) => (percent(u.load), percent(u.memory)),
            None => ("-".to_string(), "-".to_string()),
        };
        let hint = match (&row.usage, row.busy) {
            (None, _) => "-",
            (Some(_), true) => "busy",
            (Some(_), false) => "idle",
        };
        let _ = writeln!(
            out,
            "  {:>4}  {:>5}  {:>5}  {:5}  {}",
            row.device_id,
            load,
            memory,
            hint,
            lock_summary(row.lock.as_ref())
        );
    }

    out
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

fn lock_summary(lock: Option<&LockInfo>) -> String {
    match lock.map(|l| &l.state) {
        None => "free".to_string(),
        Some(LockState::Held(record)) => {
            format!("{} (pid {})", record.owner_user, record.owner_pid)
        }
        Some(LockState::Stale(record)) => {
            format!("stale: {} (pid {})", record.owner_user, record.owner_pid)
        }
        Some(LockState::Corrupt(_)) => "corrupt".to_string(),
    }
}
