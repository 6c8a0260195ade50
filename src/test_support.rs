use crate::locks::{LockRecord, LockStore};
use std::process::Command;
use tempfile::TempDir;

/// Create an isolated lock directory for one test.
pub(crate) fn create_test_store() -> (TempDir, LockStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = LockStore::open(temp_dir.path().join("gpu_lock")).unwrap();
    (temp_dir, store)
}

/// PID of a process that has exited and been reaped.
pub(crate) fn dead_pid() -> u32 {
    let mut child = Command::new("true")
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn `true`: {}", e));
    let pid = child.id();
    child.wait().unwrap();
    pid
}

/// PID of a process that is alive for the whole test and is not us.
pub(crate) fn live_foreign_pid() -> u32 {
    std::os::unix::process::parent_id()
}

/// Write a record straight to disk, bypassing the claim protocol.
pub(crate) fn write_record(store: &LockStore, device_id: u32, user: &str, pid: u32) -> LockRecord {
    let record = LockRecord::new(device_id, user, pid);
    std::fs::write(store.record_path(device_id), record.encode().unwrap()).unwrap();
    record
}

/// Read back the record stored for `device_id`.
pub(crate) fn read_record(store: &LockStore, device_id: u32) -> LockRecord {
    let bytes = std::fs::read(store.record_path(device_id)).unwrap();
    LockRecord::decode(&bytes).unwrap()
}
