//! Cross-process mutual exclusion for items mid-claim.
//!
//! A lock exists only while an item is between "seen in a delta" and "claim
//! recorded"; it is not a general-purpose lock service. Acquisition is
//! non-blocking, and an unreleased lock becomes eligible for takeover after
//! a staleness threshold. This is a deliberate liveness-over-safety tradeoff: a
//! holder slower than the threshold may be preempted, but a crashed holder
//! never wedges an item.
//!
//! The backing primitive is abstracted behind [`ItemLock`] so exclusive file
//! creation (the shipped [`FsLockStore`]) could be swapped for, say, a
//! conditional put in a key-value store without touching the guarded
//! protocol.

use std::io;

use thiserror::Error;
use tracing::warn;

use crate::types::{HolderId, ItemId};

pub mod fs;

pub use fs::FsLockStore;

/// Default staleness threshold after which a lock is presumed abandoned.
pub const DEFAULT_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(30);

/// Errors that can occur during lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item id unsafe to use as a filename.
    #[error("invalid item id: contains unsafe characters: {0}")]
    InvalidItemId(ItemId),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Capability interface for per-item mutual exclusion.
///
/// At most one process holds an unexpired lock for a given item at any
/// instant. Implementations must make `try_acquire` atomic with respect to
/// concurrent acquirers: when two race, exactly one wins.
pub trait ItemLock: Send + Sync {
    /// Attempts to acquire the lock for `item`.
    ///
    /// Returns `Ok(false)` without blocking if another holder has an
    /// unexpired lock, or if the race for a free slot was lost. A stale lock
    /// (older than the threshold) is removed and the acquisition proceeds.
    fn try_acquire(&self, item: &ItemId, holder: &HolderId) -> Result<bool>;

    /// Releases the lock for `item`.
    ///
    /// Idempotent: releasing an absent lock is not an error.
    fn release(&self, item: &ItemId) -> Result<()>;

    /// Removes every lock record older than the staleness threshold,
    /// returning how many were removed.
    ///
    /// Run once at startup so recovery from a crashed process does not wait
    /// for per-item contention to discover the leftovers.
    fn sweep_stale(&self) -> Result<usize>;
}

/// RAII guard that releases its lock when dropped.
///
/// Guarantees the "release on every exit path" requirement of the guarded
/// protocol: early skips, side-effect panics, and normal completion all end
/// in the same `Drop`.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard<'a> {
    locks: &'a dyn ItemLock,
    item: ItemId,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.locks.release(&self.item) {
            // The lock will self-expire after the staleness threshold.
            warn!(item = %self.item, error = %e, "failed to release item lock");
        }
    }
}

/// Acquires the lock for `item`, returning a guard that releases it on drop,
/// or `None` if the lock is currently held elsewhere.
pub fn acquire_scoped<'a>(
    locks: &'a dyn ItemLock,
    item: &ItemId,
    holder: &HolderId,
) -> Result<Option<LockGuard<'a>>> {
    if locks.try_acquire(item, holder)? {
        Ok(Some(LockGuard {
            locks,
            item: item.clone(),
        }))
    } else {
        Ok(None)
    }
}
