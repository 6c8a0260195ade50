//! Implementation of the `gpulock clear` command.
//!
//! Manual cleanup of a lock record. Stale and unreadable records go without
//! question; a record whose owner is still running needs `--force`.

use crate::cli::ClearArgs;
use gpulock::config::Config;
use gpulock::error::Result;
use gpulock::exit_codes::SUCCESS;
use gpulock::locks::LockStore;

/// Execute the `gpulock clear` command.
pub fn cmd_clear(config: &Config, args: ClearArgs) -> Result<i32> {
    let store = LockStore::new(&config.lock_dir);
    let info = store.clear(args.gpu, args.force)?;

    println!("Cleared lock: {}", info);
    Ok(SUCCESS)
}
