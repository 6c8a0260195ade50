//! Tests for the locks subsystem.

use super::*;
use crate::error::GpuLockError;
use crate::test_support::{
    create_test_store, dead_pid, live_foreign_pid, read_record, write_record,
};
use std::path::Path;
use tempfile::TempDir;

fn me() -> u32 {
    std::process::id()
}

#[test]
fn test_open_creates_world_writable_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("gpu_lock");

    let store = LockStore::open(&root).unwrap();
    assert!(store.root().is_dir());

    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(&root).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o777);

    // Opening an existing directory is fine.
    LockStore::open(&root).unwrap();
}

#[test]
fn test_open_missing_parent_fails() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("missing").join("gpu_lock");

    let err = LockStore::open(&root).unwrap_err();
    assert!(matches!(err, GpuLockError::IoError(_)));
}

#[test]
fn test_open_rejects_file_at_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("gpu_lock");
    std::fs::write(&root, "not a directory").unwrap();

    assert!(LockStore::open(&root).is_err());
}

#[test]
fn test_record_path_is_keyed_by_device() {
    let store = LockStore::new("/var/tmp/gpu_lock");
    assert_eq!(
        store.record_path(3),
        std::path::PathBuf::from("/var/tmp/gpu_lock/gpu_3.json")
    );
}

#[test]
fn test_claim_free_device() {
    let (_temp_dir, store) = create_test_store();

    let result = store.try_claim(0, "alice", me()).unwrap();
    assert_eq!(result, ClaimResult::Claimed);

    let record = read_record(&store, 0);
    assert_eq!(record.device_id, 0);
    assert_eq!(record.owner_pid, me());
    assert_eq!(record.owner_user, "alice");
}

#[test]
fn test_claim_leaves_no_temp_files() {
    let (_temp_dir, store) = create_test_store();

    store.try_claim(0, "alice", me()).unwrap();
    write_record(&store, 1, "bob", dead_pid());
    store.try_claim(1, "alice", me()).unwrap();

    let names: Vec<String> = std::fs::read_dir(store.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 2, "unexpected files: {:?}", names);
}

#[test]
fn test_claim_held_by_live_foreign_process_is_busy() {
    let (_temp_dir, store) = create_test_store();
    let holder = write_record(&store, 0, "bob", live_foreign_pid());
    let before = std::fs::read(store.record_path(0)).unwrap();

    let result = store.try_claim(0, "alice", me()).unwrap();
    assert_eq!(result, ClaimResult::Busy(holder));
    assert!(!result.is_claimed());

    // The holder's record is untouched.
    assert_eq!(std::fs::read(store.record_path(0)).unwrap(), before);
}

#[test]
fn test_claim_held_by_live_process_of_same_user_is_busy() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "alice", live_foreign_pid());

    let result = store.try_claim(0, "alice", me()).unwrap();
    assert!(matches!(result, ClaimResult::Busy(_)));
}

#[test]
fn test_claim_overrides_dead_owner() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 2, "bob", dead_pid());

    let result = store.try_claim(2, "alice", me()).unwrap();
    assert_eq!(result, ClaimResult::Claimed);

    let record = read_record(&store, 2);
    assert_eq!(record.owner_pid, me());
    assert_eq!(record.owner_user, "alice");
}

#[test]
fn test_claim_overrides_nonexistent_pid() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 2, "bob", 99_999_999);

    assert!(store.try_claim(2, "alice", me()).unwrap().is_claimed());
    assert_eq!(read_record(&store, 2).owner_pid, me());
}

#[test]
fn test_claim_renews_own_record() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 1, "someone-else", me());

    assert!(store.try_claim(1, "alice", me()).unwrap().is_claimed());
    assert_eq!(read_record(&store, 1).owner_user, "alice");
}

#[test]
fn test_claim_overrides_corrupt_record() {
    let (_temp_dir, store) = create_test_store();
    let full = LockRecord::new(5, "bob", live_foreign_pid()).encode().unwrap();
    std::fs::write(store.record_path(5), &full[..full.len() / 2]).unwrap();

    assert!(store.try_claim(5, "alice", me()).unwrap().is_claimed());
    assert_eq!(read_record(&store, 5).owner_pid, me());
}

#[test]
fn test_claim_overrides_empty_record() {
    let (_temp_dir, store) = create_test_store();
    std::fs::write(store.record_path(4), b"").unwrap();

    assert!(store.try_claim(4, "alice", me()).unwrap().is_claimed());
}

#[test]
fn test_claim_overrides_record_for_other_device() {
    let (_temp_dir, store) = create_test_store();
    let misplaced = LockRecord::new(9, "bob", live_foreign_pid());
    std::fs::write(store.record_path(3), misplaced.encode().unwrap()).unwrap();

    assert!(store.try_claim(3, "alice", me()).unwrap().is_claimed());
    assert_eq!(read_record(&store, 3).device_id, 3);
}

#[test]
fn test_second_claimant_is_refused() {
    let (_temp_dir, store) = create_test_store();

    // We claim GPU 0; the parent process then asks for it.
    assert!(store.try_claim(0, "alice", me()).unwrap().is_claimed());
    let result = store.try_claim(0, "bob", live_foreign_pid()).unwrap();

    match result {
        ClaimResult::Busy(holder) => {
            assert_eq!(holder.owner_pid, me());
            assert_eq!(holder.owner_user, "alice");
        }
        other => panic!("expected GPU 0 to be busy, got {:?}", other),
    }
}

#[test]
fn test_claim_retries_exclusive_create_when_record_vanishes() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", live_foreign_pid());

    // The holder releases right after our exclusive create failed.
    let mut conflicts = 0;
    set_claim_conflict_hook(Some(Box::new(move |path: &Path| {
        conflicts += 1;
        if conflicts == 1 {
            std::fs::remove_file(path).unwrap();
        }
    })));
    let result = store.try_claim(0, "alice", me());
    set_claim_conflict_hook(None);

    assert_eq!(result.unwrap(), ClaimResult::Claimed);
    assert_eq!(read_record(&store, 0).owner_pid, me());
}

#[test]
fn test_claim_rereads_record_after_failed_create() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", dead_pid());

    // The old record goes away and a competitor wins the exclusive create
    // before we retry.
    let foreign = live_foreign_pid();
    set_claim_conflict_hook(Some(Box::new(move |path: &Path| {
        if std::fs::read(path)
            .ok()
            .and_then(|bytes| LockRecord::decode(&bytes).ok())
            .is_some_and(|record| record.owner_user == "bob")
        {
            std::fs::remove_file(path).unwrap();
            let carol = LockRecord::new(0, "carol", foreign);
            std::fs::write(path, carol.encode().unwrap()).unwrap();
        }
    })));
    let result = store.try_claim(0, "alice", me());
    set_claim_conflict_hook(None);

    match result.unwrap() {
        ClaimResult::Busy(holder) => assert_eq!(holder.owner_user, "carol"),
        other => panic!("expected GPU 0 to be busy, got {:?}", other),
    }
    assert_eq!(read_record(&store, 0).owner_user, "carol");
}

#[test]
fn test_claim_never_replaces_a_record_it_cannot_read() {
    let (_temp_dir, store) = create_test_store();
    let path = store.record_path(0);

    // A dangling symlink makes every exclusive create fail while every read
    // reports the record missing.
    std::os::unix::fs::symlink(store.root().join("nowhere"), &path).unwrap();

    let result = store.try_claim(0, "alice", me()).unwrap();

    assert_eq!(result, ClaimResult::Contended);
    assert!(!result.is_claimed());
    assert!(
        std::fs::symlink_metadata(&path)
            .unwrap()
            .file_type()
            .is_symlink()
    );
}

#[test]
fn test_release_removes_own_record() {
    let (_temp_dir, store) = create_test_store();
    store.try_claim(0, "alice", me()).unwrap();

    assert!(store.release(0, me()).unwrap());
    assert!(!store.record_path(0).exists());
}

#[test]
fn test_release_is_idempotent() {
    let (_temp_dir, store) = create_test_store();
    store.try_claim(0, "alice", me()).unwrap();

    assert!(store.release(0, me()).unwrap());
    assert!(!store.release(0, me()).unwrap());

    // Someone else claims afterwards; our stray release must not touch it.
    write_record(&store, 0, "bob", live_foreign_pid());
    assert!(!store.release(0, me()).unwrap());
    assert_eq!(read_record(&store, 0).owner_user, "bob");
}

#[test]
fn test_release_ignores_foreign_and_corrupt_records() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", live_foreign_pid());
    std::fs::write(store.record_path(1), b"{").unwrap();

    assert!(!store.release(0, me()).unwrap());
    assert!(!store.release(1, me()).unwrap());
    assert!(store.record_path(0).exists());
    assert!(store.record_path(1).exists());
}

#[test]
fn test_inspect_classifies_records() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", live_foreign_pid());
    write_record(&store, 1, "carol", dead_pid());
    std::fs::write(store.record_path(2), b"not json").unwrap();

    assert!(matches!(
        store.inspect(0).unwrap().unwrap().state,
        LockState::Held(_)
    ));
    assert!(matches!(
        store.inspect(1).unwrap().unwrap().state,
        LockState::Stale(_)
    ));
    assert!(matches!(
        store.inspect(2).unwrap().unwrap().state,
        LockState::Corrupt(_)
    ));
    assert!(store.inspect(3).unwrap().is_none());
}

#[test]
fn test_list_locks_sorted_and_filtered() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 10, "bob", live_foreign_pid());
    write_record(&store, 2, "carol", dead_pid());
    std::fs::write(store.root().join("notes.txt"), "ignored").unwrap();
    std::fs::write(store.root().join("gpu_x.json"), "ignored").unwrap();

    let locks = store.list().unwrap();
    let ids: Vec<u32> = locks.iter().map(|l| l.device_id).collect();
    assert_eq!(ids, vec![2, 10]);
}

#[test]
fn test_list_locks_missing_directory_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = LockStore::new(temp_dir.path().join("never-created"));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_clear_stale_lock() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 1, "carol", dead_pid());

    let cleared = store.clear(1, false).unwrap();
    assert_eq!(cleared.device_id, 1);
    assert_eq!(cleared.state.as_str(), "stale");
    assert!(!store.record_path(1).exists());
}

#[test]
fn test_clear_held_lock_requires_force() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", live_foreign_pid());

    let err = store.clear(0, false).unwrap_err();
    assert!(err.to_string().contains("--force"));
    assert!(store.record_path(0).exists());

    store.clear(0, true).unwrap();
    assert!(!store.record_path(0).exists());
}

#[test]
fn test_clear_nonexistent_fails() {
    let (_temp_dir, store) = create_test_store();

    let err = store.clear(7, true).unwrap_err();
    assert!(err.to_string().contains("no lock record"));
}

#[test]
fn test_lock_info_display() {
    let (_temp_dir, store) = create_test_store();
    write_record(&store, 0, "bob", live_foreign_pid());
    write_record(&store, 1, "carol", dead_pid());
    std::fs::write(store.record_path(2), b"{").unwrap();

    let held = store.inspect(0).unwrap().unwrap().to_string();
    assert!(held.contains("GPU 0"));
    assert!(held.contains("bob"));
    assert!(!held.contains("STALE"));

    let stale = store.inspect(1).unwrap().unwrap().to_string();
    assert!(stale.contains("STALE"));

    let corrupt = store.inspect(2).unwrap().unwrap().to_string();
    assert!(corrupt.contains("CORRUPT"));
}

#[test]
fn test_parse_record_name() {
    assert_eq!(store::parse_record_name("gpu_0.json"), Some(0));
    assert_eq!(store::parse_record_name("gpu_15.json"), Some(15));
    assert_eq!(store::parse_record_name("gpu_.json"), None);
    assert_eq!(store::parse_record_name("gpu_+1.json"), None);
    assert_eq!(store::parse_record_name(".gpu_1.json.42.tmp"), None);
    assert_eq!(store::parse_record_name("cpu_1.json"), None);
}

// ---------------------------------------------------------------------------
// GpuLock
// ---------------------------------------------------------------------------

fn claim_into_handle(store: &LockStore, ids: &[u32]) -> GpuLock {
    let mut lock = GpuLock::empty(store.clone(), me());
    for &id in ids {
        assert!(store.try_claim(id, "alice", me()).unwrap().is_claimed());
        lock.push(id);
    }
    lock
}

#[test]
fn test_guard_drop_releases_all() {
    let (_temp_dir, store) = create_test_store();

    let lock = claim_into_handle(&store, &[0, 2]);
    assert_eq!(lock.device_ids(), &[0, 2]);
    assert_eq!(lock.len(), 2);
    assert_eq!(lock.owner_pid(), me());
    assert!(store.record_path(0).exists());

    drop(lock);

    assert!(!store.record_path(0).exists());
    assert!(!store.record_path(2).exists());
}

#[test]
fn test_guard_manual_release() {
    let (_temp_dir, store) = create_test_store();

    let lock = claim_into_handle(&store, &[1]);
    lock.release().unwrap();

    assert!(!store.record_path(1).exists());
}

#[test]
fn test_guard_releases_on_panic() {
    let (_temp_dir, store) = create_test_store();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _lock = claim_into_handle(&store, &[3]);
        panic!("work failed");
    }));

    assert!(result.is_err());
    assert!(!store.record_path(3).exists());
}

#[test]
fn test_guard_does_not_release_overridden_record() {
    let (_temp_dir, store) = create_test_store();

    let lock = claim_into_handle(&store, &[0]);
    // Another participant took the device over in the meantime.
    write_record(&store, 0, "bob", live_foreign_pid());
    drop(lock);

    assert_eq!(read_record(&store, 0).owner_user, "bob");
}

#[test]
fn test_guard_release_tolerates_missing_records() {
    let (_temp_dir, store) = create_test_store();

    let lock = claim_into_handle(&store, &[0]);
    std::fs::remove_file(store.record_path(0)).unwrap();

    lock.release().unwrap();
}

#[test]
fn test_empty_guard() {
    let (_temp_dir, store) = create_test_store();

    let lock = GpuLock::empty(store, me());
    assert!(lock.is_empty());
    assert_eq!(lock.visible_devices(), "");
    lock.release().unwrap();
}
