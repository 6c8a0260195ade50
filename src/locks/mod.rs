//! Locking subsystem for gpulock.
//!
//! This module implements advisory, per-GPU locks shared by every process on
//! the host through a single directory (default `/var/tmp/gpu_lock`).
//!
//! # Lock Files
//!
//! Each GPU has at most one record file, `gpu_<id>.json`. A free GPU is
//! claimed with an exclusive create, so two processes racing for a GPU that
//! has no record cannot both win.
//!
//! # Lock Records
//!
//! Each lock file contains JSON:
//! - `user`: The acquiring user
//! - `time`: Creation time, seconds since the epoch
//! - `id`: The GPU index
//! - `owner`: The acquiring process ID
//!
//! # Staleness
//!
//! A record never proves that its owner is still running. Whenever a claim
//! meets an existing record it checks the owner again: a record whose owner
//! has exited, that belongs to the requesting process itself, or that cannot
//! be decoded is overridden.
//!
//! # RAII Guards
//!
//! Claimed GPUs are returned inside a [`GpuLock`] that releases them when
//! dropped. If deletion fails during drop, a warning is logged but the
//! program does not crash.

mod guard;
pub mod liveness;
mod owner;
mod record;
mod store;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use guard::GpuLock;
pub use liveness::is_alive;
pub use owner::Owner;
pub use record::{CorruptRecord, LockRecord};
pub use store::LockStore;
pub use types::{ClaimResult, LockInfo, LockState};

#[cfg(test)]
pub(crate) use store::set_claim_conflict_hook;
