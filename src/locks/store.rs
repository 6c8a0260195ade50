//! Per-device lock files and the claim/release protocol.

use super::liveness::is_alive;
use super::record::{CorruptRecord, LockRecord};
use super::types::{ClaimResult, LockInfo, LockState};
use crate::error::{GpuLockError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RECORD_PREFIX: &str = "gpu_";
const RECORD_SUFFIX: &str = ".json";

/// Mode for a lock directory this process creates. Every user must be able
/// to add, replace and remove records in it.
const DIR_MODE: u32 = 0o777;

/// Mode for record files.
const RECORD_MODE: u32 = 0o666;

/// Exclusive-create rounds `try_claim` makes while the record keeps vanishing.
const PUBLISH_ATTEMPTS: usize = 3;

/// A directory of per-device lock records.
///
/// All participants on the host point at the same directory; there is no
/// other shared state. Operations on different devices never contend.
#[derive(Debug, Clone)]
pub struct LockStore {
    root: PathBuf,
}

/// What an acquirer found at a device's record path.
enum Existing {
    Missing,
    Corrupt(CorruptRecord),
    Record(LockRecord),
}

impl LockStore {
    /// Create a store rooted at `root` without touching the filesystem.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// Only the last path component is created. A missing parent, or a
    /// non-directory at `root`, is a fatal error.
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let store = Self::new(root);

        match fs::create_dir(&store.root) {
            Ok(()) => {
                // mkdir's mode is filtered through the umask
                set_mode(&store.root, DIR_MODE).map_err(|e| {
                    GpuLockError::io("set permissions on lock directory", &store.root, e)
                })?;
                debug!(dir = %store.root.display(), "Created lock directory");
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !store.root.is_dir() {
                    return Err(GpuLockError::IoError(format!(
                        "lock directory '{}' exists but is not a directory",
                        store.root.display()
                    )));
                }
            }
            Err(e) => return Err(GpuLockError::io("create lock directory", &store.root, e)),
        }

        Ok(store)
    }

    /// The lock directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `device_id`.
    pub fn record_path(&self, device_id: u32) -> PathBuf {
        self.root
            .join(format!("{}{}{}", RECORD_PREFIX, device_id, RECORD_SUFFIX))
    }

    /// Try to claim `device_id` for `requester_pid`.
    ///
    /// A free device is claimed with an exclusive create. An existing record
    /// is overridden when it is corrupt, owned by the requester itself, or
    /// owned by a process that is no longer alive; otherwise the device is
    /// `Busy` and the record is left untouched.
    ///
    /// A record that disappears before it can be read was released by its
    /// holder, so the exclusive create is attempted again. After
    /// `PUBLISH_ATTEMPTS` such rounds the device is reported `Contended`.
    ///
    /// The override is not atomic across processes: two acquirers that judge
    /// the same record stale at the same moment may both return `Claimed`.
    /// This is a known limitation of a daemonless, file-based protocol.
    pub fn try_claim(
        &self,
        device_id: u32,
        requester_user: &str,
        requester_pid: u32,
    ) -> Result<ClaimResult> {
        let record = LockRecord::new(device_id, requester_user, requester_pid);
        let mut attempts = 0;

        loop {
            if self.publish_exclusive(&record)? {
                debug!(gpu = device_id, pid = requester_pid, "Acquired lock on GPU");
                return Ok(ClaimResult::Claimed);
            }
            attempts += 1;

            #[cfg(test)]
            run_claim_conflict_hook(&self.record_path(device_id));

            match self.load(device_id)? {
                Existing::Missing if attempts < PUBLISH_ATTEMPTS => {
                    debug!(
                        gpu = device_id,
                        attempt = attempts,
                        "Lock record vanished before it could be read; retrying"
                    );
                    continue;
                }
                Existing::Missing => {
                    info!(gpu = device_id, "GPU lock record keeps changing; giving up on it");
                    return Ok(ClaimResult::Contended);
                }
                Existing::Corrupt(err) => {
                    warn!(gpu = device_id, error = %err, "Overriding unreadable GPU lock record");
                }
                Existing::Record(holder) if holder.owner_pid == requester_pid => {
                    warn!(
                        gpu = device_id,
                        pid = requester_pid,
                        "Found existing GPU lock for this process; renewing it. \
                         Release locks when your work finishes"
                    );
                }
                Existing::Record(holder) if !is_alive(holder.owner_pid) => {
                    warn!(
                        gpu = device_id,
                        user = %holder.owner_user,
                        pid = holder.owner_pid,
                        "Recovering stale GPU lock (holder is not running)"
                    );
                }
                Existing::Record(holder) => {
                    info!(
                        gpu = device_id,
                        user = %holder.owner_user,
                        pid = holder.owner_pid,
                        "GPU is locked by a running process"
                    );
                    return Ok(ClaimResult::Busy(holder));
                }
            }
            break;
        }

        self.replace(&record)?;
        debug!(gpu = device_id, pid = requester_pid, "Acquired lock on GPU by override");
        Ok(ClaimResult::Claimed)
    }

    /// Release `device_id` if its record is owned by `owner_pid`.
    ///
    /// Returns whether a record was removed. A missing, unreadable or
    /// foreign record is left alone and is not an error.
    pub fn release(&self, device_id: u32, owner_pid: u32) -> Result<bool> {
        let path = self.record_path(device_id);

        match self.load(device_id)? {
            Existing::Record(record) if record.owner_pid == owner_pid => {}
            _ => {
                debug!(gpu = device_id, "No lock record of ours to release");
                return Ok(false);
            }
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(gpu = device_id, "Released GPU lock");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GpuLockError::io("remove lock record", &path, e)),
        }
    }

    /// Classify the record for `device_id`, if there is one.
    pub fn inspect(&self, device_id: u32) -> Result<Option<LockInfo>> {
        let state = match self.load(device_id)? {
            Existing::Missing => return Ok(None),
            Existing::Corrupt(err) => LockState::Corrupt(err.0),
            Existing::Record(record) if is_alive(record.owner_pid) => LockState::Held(record),
            Existing::Record(record) => LockState::Stale(record),
        };

        Ok(Some(LockInfo {
            path: self.record_path(device_id),
            device_id,
            state,
        }))
    }

    /// List every lock record in the directory, ordered by device.
    pub fn list(&self) -> Result<Vec<LockInfo>> {
        let mut locks = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(locks),
            Err(e) => return Err(GpuLockError::io("read lock directory", &self.root, e)),
        };

        for entry in entries {
            let entry =
                entry.map_err(|e| GpuLockError::io("read lock directory entry", &self.root, e))?;

            let Some(device_id) = entry.file_name().to_str().and_then(parse_record_name) else {
                continue;
            };

            if let Some(info) = self.inspect(device_id)? {
                locks.push(info);
            }
        }

        locks.sort_by_key(|l| l.device_id);
        Ok(locks)
    }

    /// Remove the record for `device_id` on an operator's request.
    ///
    /// Stale and corrupt records are removed outright. A record whose owner
    /// is still running is only removed with `force`.
    pub fn clear(&self, device_id: u32, force: bool) -> Result<LockInfo> {
        let info = self.inspect(device_id)?.ok_or_else(|| {
            GpuLockError::UserError(format!(
                "no lock record for GPU {} at: {}",
                device_id,
                self.record_path(device_id).display()
            ))
        })?;

        if info.state.is_held() && !force {
            return Err(GpuLockError::UserError(format!(
                "refusing to clear a lock held by a running process: {}\n\n\
                 Use --force to remove it anyway.",
                info
            )));
        }

        match fs::remove_file(&info.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(GpuLockError::io("clear lock record", &info.path, e)),
        }

        warn!(gpu = device_id, state = info.state.as_str(), "Cleared GPU lock record");
        Ok(info)
    }

    /// Read and decode whatever is stored for `device_id`.
    fn load(&self, device_id: u32) -> Result<Existing> {
        let path = self.record_path(device_id);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Missing),
            Err(e) => return Err(GpuLockError::io("read lock record", &path, e)),
        };

        Ok(match LockRecord::decode(&bytes) {
            Ok(record) if record.device_id == device_id => Existing::Record(record),
            Ok(record) => Existing::Corrupt(CorruptRecord(format!(
                "record names GPU {} but is stored as GPU {}",
                record.device_id, device_id
            ))),
            Err(err) => Existing::Corrupt(err),
        })
    }

    /// Publish `record` only if no record exists yet.
    ///
    /// The record is fully written to a private file first and then
    /// hard-linked into place. `link(2)` fails if the target exists, so this
    /// is the exclusive create, and no reader can observe a partial record.
    fn publish_exclusive(&self, record: &LockRecord) -> Result<bool> {
        let target = self.record_path(record.device_id);
        let temp = self.write_temp(record)?;

        let linked = fs::hard_link(&temp, &target);
        let _ = fs::remove_file(&temp);

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(GpuLockError::io("create lock record", &target, e)),
        }
    }

    /// Unconditionally install `record`, replacing any existing one.
    fn replace(&self, record: &LockRecord) -> Result<()> {
        let target = self.record_path(record.device_id);
        let temp = self.write_temp(record)?;

        fs::rename(&temp, &target).map_err(|e| {
            let _ = fs::remove_file(&temp);
            GpuLockError::io("replace lock record", &target, e)
        })
    }

    /// Write `record` to a private temp file next to its final location.
    fn write_temp(&self, record: &LockRecord) -> Result<PathBuf> {
        let temp = self.root.join(format!(
            ".{}{}{}.{}.tmp",
            RECORD_PREFIX,
            record.device_id,
            RECORD_SUFFIX,
            std::process::id()
        ));
        let content = record.encode()?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| GpuLockError::io("create temporary lock record", &temp, e))?;

        let written = file
            .write_all(&content)
            .and_then(|()| file.sync_all())
            .and_then(|()| set_mode(&temp, RECORD_MODE));

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(GpuLockError::io("write temporary lock record", &temp, e));
        }

        Ok(temp)
    }
}

/// Parse a device id out of a record file name such as `gpu_3.json`.
pub(crate) fn parse_record_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(RECORD_PREFIX)?.strip_suffix(RECORD_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
thread_local! {
    static CLAIM_CONFLICT_HOOK: std::cell::RefCell<Option<Box<dyn FnMut(&Path)>>> =
        const { std::cell::RefCell::new(None) };
}

/// Run `hook` on this thread each time `try_claim` finds an existing record,
/// after the failed exclusive create and before the record is read.
#[cfg(test)]
pub(crate) fn set_claim_conflict_hook(hook: Option<Box<dyn FnMut(&Path)>>) {
    CLAIM_CONFLICT_HOOK.with(|slot| *slot.borrow_mut() = hook);
}

#[cfg(test)]
fn run_claim_conflict_hook(path: &Path) {
    CLAIM_CONFLICT_HOOK.with(|slot| {
        if let Some(hook) = slot.borrow_mut().as_mut() {
            hook(path);
        }
    });
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
