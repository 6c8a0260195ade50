//! Process liveness checks for lock holders.
//!
//! A pid is alive when `kill(pid, 0)` succeeds or fails with `EPERM` (the
//! process exists but belongs to another user). On Linux, zombie and dead
//! processes are additionally reported as not alive.
//!
//! Pid recycling is not detected: a recycled pid makes a stale record look
//! held until the unrelated process exits.

/// Check whether `pid` currently denotes a live process.
///
/// Never fails; a missing process is simply `false`.
pub fn is_alive(pid: u32) -> bool {
    // kill(0, ..) addresses our own process group.
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };

    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs an existence check only; no signal is
        // delivered and no memory is touched. pid is positive.
        let result = unsafe { libc::kill(pid_i32, 0) };
        if result != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno != libc::EPERM {
                return false;
            }
        }
        !is_defunct(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid_i32;
        true
    }
}

/// Whether `/proc` reports the process as a zombie or dead.
#[cfg(target_os = "linux")]
fn is_defunct(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => matches!(parse_stat_state(&stat), Some('Z' | 'X' | 'x')),
        Err(_) => false,
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_defunct(_pid: u32) -> bool {
    false
}

/// Extract the state field from a `/proc/<pid>/stat` line.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so the state is the first field after the last `)`.
#[cfg(any(target_os = "linux", test))]
fn parse_stat_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().next()?.chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dead_pid, live_foreign_pid};

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_parent_process_is_alive() {
        assert!(is_alive(live_foreign_pid()));
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        assert!(!is_alive(dead_pid()));
    }

    #[test]
    fn test_out_of_range_pids_are_not_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(99_999_999));
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn test_parse_stat_state() {
        assert_eq!(parse_stat_state("1234 (bash) S 1 1234 1234"), Some('S'));
        assert_eq!(parse_stat_state("77 (odd) name) Z 1 77 77"), Some('Z'));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_zombie_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();

        // Leave the child unreaped until it has become a zombie.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while is_alive(pid) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!is_alive(pid));

        child.wait().unwrap();
    }
}
