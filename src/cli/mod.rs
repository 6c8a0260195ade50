//! CLI argument parsing for gpulock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use gpulock::DeviceRequest;
use std::path::PathBuf;

/// gpulock: advisory GPU locking for shared machines.
///
/// Processes agree on which GPUs are in use through lock records in a shared
/// directory (default /var/tmp/gpu_lock). Locks are advisory: they only bind
/// programs that take them.
#[derive(Parser, Debug)]
#[command(name = "gpulock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to $GPULOCK_CONFIG, then built-in defaults).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for info, -vv for debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for gpulock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lock GPUs, run a command on them, and release them afterwards.
    ///
    /// The command sees only the locked GPUs through CUDA_VISIBLE_DEVICES.
    /// gpulock exits with the command's exit code.
    Run(RunArgs),

    /// Show current lock records.
    ///
    /// Lists every locked GPU with its owner and age, marking stale and
    /// unreadable records.
    Status,

    /// Remove a lock record.
    ///
    /// Stale and unreadable records are removed directly; a record held by a
    /// running process requires --force.
    Clear(ClearArgs),

    /// Show GPUs on this host and which ones look busy.
    Devices,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Lock this specific GPU instead of picking free ones.
    #[arg(long, value_name = "ID", conflicts_with = "count")]
    pub gpu: Option<u32>,

    /// Number of GPUs to lock.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Command to run, followed by its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

impl RunArgs {
    /// The lock request these arguments describe.
    pub fn request(&self) -> DeviceRequest {
        match self.gpu {
            Some(id) => DeviceRequest::Single(id),
            None if self.count == 1 => DeviceRequest::Any,
            None => DeviceRequest::Count(self.count),
        }
    }
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// GPU index whose lock record should be removed.
    pub gpu: u32,

    /// Remove the record even if its owner is still running.
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
