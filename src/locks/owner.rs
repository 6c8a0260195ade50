//! Identity written into lock records.

/// The principal a claim is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    /// Login name of the acquiring user.
    pub user: String,
    /// PID recorded as the holder; staleness is judged by this process.
    pub pid: u32,
}

impl Owner {
    pub fn new(user: impl Into<String>, pid: u32) -> Self {
        Self {
            user: user.into(),
            pid,
        }
    }

    /// The current user and process.
    pub fn current() -> Self {
        Self::new(current_user(), std::process::id())
    }
}

/// Get the login name of the current user.
///
/// Follows the usual environment lookup order and falls back to the numeric
/// uid, which is always available.
fn current_user() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|name| !name.is_empty())
        .unwrap_or_else(fallback_user)
}

#[cfg(unix)]
fn fallback_user() -> String {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    format!("uid:{}", uid)
}

#[cfg(not(unix))]
fn fallback_user() -> String {
    "unknown".to_string()
}
