//! Implementation of the `gpulock status` command.
//!
//! Lists every lock record in the lock directory with its owner, age and
//! whether the owner is still running.

use gpulock::config::Config;
use gpulock::error::Result;
use gpulock::exit_codes::SUCCESS;
use gpulock::locks::{LockInfo, LockState, LockStore};
use std::fmt::Write as _;
use std::path::Path;

/// Execute the `gpulock status` command.
pub fn cmd_status(config: &Config) -> Result<i32> {
    let store = LockStore::new(&config.lock_dir);
    let locks = store.list()?;

    print!("{}", render_status(store.root(), &locks));
    Ok(SUCCESS)
}

/// Format the status report for `locks` found under `root`.
fn render_status(root: &Path, locks: &[LockInfo]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "GPU Locks ({})", root.display());
    let _ = writeln!(out, "=========");
    let _ = writeln!(out);

    if locks.is_empty() {
        let _ = writeln!(out, "No GPUs are locked.");
        return out;
    }

    let _ = writeln!(
        out,
        "  {:>4}  {:8} {:12} {:>8}  {}",
        "GPU", "STATE", "USER", "PID", "AGE"
    );
    for lock in locks {
        match &lock.state {
            LockState::Held(record) | LockState::Stale(record) => {
                let _ = writeln!(
                    out,
                    "  {:>4}  {:8} {:12} {:>8}  {}",
                    lock.device_id,
                    lock.state.as_str(),
                    record.owner_user,
                    record.owner_pid,
                    record.age_string()
                );
            }
            LockState::Corrupt(reason) => {
                let _ = writeln!(
                    out,
                    "  {:>4}  {:8} {}",
                    lock.device_id,
                    lock.state.as_str(),
                    reason
                );
            }
        }
    }

    let reclaimable = locks.iter().filter(|l| !l.state.is_held()).count();
    if reclaimable > 0 {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} record(s) are stale or unreadable; the next acquirer reclaims them,",
            reclaimable
        );
        let _ = writeln!(out, "or remove one now with `gpulock clear <GPU>`.");
    }

    out
}
