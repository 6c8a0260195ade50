//! Command implementations for gpulock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Each handler returns the process exit code on success.

mod clear;
mod devices;
mod run;
mod status;

use crate::cli::{Cli, Command};
use gpulock::config::Config;
use gpulock::error::Result;
use tracing::debug;

/// Dispatch a command to its implementation.
///
/// Resolves the configuration once (`--config`, then `$GPULOCK_CONFIG`,
/// then built-in defaults) and hands it to the command handler.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let config = Config::resolve(cli.config.as_deref())?;
    debug!(lock_dir = %config.lock_dir.display(), "Resolved configuration");

    match cli.command {
        Command::Run(args) => run::cmd_run(&config, args),
        Command::Status => status::cmd_status(&config),
        Command::Clear(args) => clear::cmd_clear(&config, args),
        Command::Devices => devices::cmd_devices(&config),
    }
}
