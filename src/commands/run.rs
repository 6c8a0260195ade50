//! Implementation of the `gpulock run` command.
//!
//! Locks GPUs, runs a child command restricted to them, and releases the
//! locks once the child exits:
//! 1. Acquire the requested GPUs (all or nothing)
//! 2. Spawn the command with `CUDA_VISIBLE_DEVICES` set to the locked ids
//! 3. Wait for it. Terminal interrupts (SIGINT, SIGQUIT) are ignored here so
//!    they only reach the child; SIGTERM and SIGHUP are forwarded to the
//!    child. Either way this process outlives the child, and the lock
//!    records it owns stay valid for as long as the child uses the GPUs
//! 4. Release the locks and exit with the child's status
//!
//! If this process is killed outright (SIGKILL), the records it leaves behind
//! are reclaimed by the next acquirer once it sees the owner is gone.

use crate::cli::RunArgs;
use gpulock::config::Config;
use gpulock::error::{GpuLockError, Result};
use gpulock::visibility;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{info, warn};

/// Execute the `gpulock run` command and return the child's exit code.
pub fn cmd_run(config: &Config, args: RunArgs) -> Result<i32> {
    let request = args.request();
    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| GpuLockError::UserError("no command given to run".to_string()))?;

    let lock = gpulock::acquire(config, request)?;

    let mut cmd = Command::new(program);
    cmd.args(program_args);
    visibility::configure_command(&mut cmd, lock.device_ids());

    info!(
        gpus = %lock.visible_devices(),
        command = %program,
        "Running command on locked GPUs"
    );

    let mut child = cmd.spawn().map_err(|e| {
        GpuLockError::UserError(format!("failed to execute '{}': {}", program, e))
    })?;

    let status = {
        // Installed after spawn so the child keeps default signal handling.
        let _relay = SignalRelay::install(child.id());
        child.wait().map_err(|e| {
            GpuLockError::UserError(format!("failed to wait for '{}': {}", program, e))
        })?
    };

    if let Err(e) = lock.release() {
        warn!(error = %e, "Failed to release GPU locks");
    }

    Ok(exit_code_of(status))
}

/// Shell-style exit code for a finished child: its own code, or 128 + signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Pid that forwarded signals are sent to; 0 while no relay is installed.
static RELAY_TARGET: AtomicI32 = AtomicI32::new(0);

#[cfg(unix)]
extern "C" fn forward_signal(signal: libc::c_int) {
    let pid = RELAY_TARGET.load(Ordering::SeqCst);
    if pid > 0 {
        // SAFETY: kill(2) is async-signal-safe.
        unsafe {
            libc::kill(pid, signal);
        }
    }
}

/// Signal dispositions for the time a child runs, restored on drop.
///
/// SIGINT and SIGQUIT are ignored, like `system(3)`. SIGTERM and SIGHUP are
/// forwarded to the child so that it stops first and the locks are released
/// after it.
struct SignalRelay {
    #[cfg(unix)]
    previous: Vec<(libc::c_int, libc::sigaction)>,
}

impl SignalRelay {
    #[cfg(unix)]
    fn install(child_pid: u32) -> Self {
        RELAY_TARGET.store(i32::try_from(child_pid).unwrap_or(0), Ordering::SeqCst);

        let forward = forward_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        let dispositions = [
            (libc::SIGINT, libc::SIG_IGN),
            (libc::SIGQUIT, libc::SIG_IGN),
            (libc::SIGTERM, forward),
            (libc::SIGHUP, forward),
        ];

        let previous = dispositions
            .into_iter()
            .filter_map(|(signal, handler)| {
                set_disposition(signal, handler).map(|old| (signal, old))
            })
            .collect();

        Self { previous }
    }

    #[cfg(not(unix))]
    fn install(child_pid: u32) -> Self {
        RELAY_TARGET.store(i32::try_from(child_pid).unwrap_or(0), Ordering::SeqCst);
        Self {}
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        #[cfg(unix)]
        for (signal, old) in &self.previous {
            // SAFETY: restores a disposition previously returned by sigaction.
            unsafe {
                libc::sigaction(*signal, old, std::ptr::null_mut());
            }
        }
        RELAY_TARGET.store(0, Ordering::SeqCst);
    }
}

/// Install `handler` for `signal`, returning the previous disposition.
#[cfg(unix)]
fn set_disposition(signal: libc::c_int, handler: libc::sighandler_t) -> Option<libc::sigaction> {
    // SAFETY: sigaction is plain data; an all-zero value has an empty mask and
    // no flags. The handler is SIG_IGN or `forward_signal`, which only calls
    // async-signal-safe functions.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        let mut old: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signal, &action, &mut old) == 0 {
            Some(old)
        } else {
            None
        }
    }
}
