//! Durable deduplication set for claimed items.
//!
//! The set records which item ids have already been claimed for processing,
//! in insertion order, capped at the N most recent entries. Claiming an item
//! beyond the cap evicts the oldest entry; entries are never deleted any
//! other way.
//!
//! # Persistence
//!
//! Every `mark_processed` synchronously rewrites the full snapshot (a JSON
//! array, oldest first) with the atomic-replace pattern. After it returns,
//! `contains` observes the id even across a reload from disk, until the id is
//! cap-evicted.
//!
//! The snapshot write is last-writer-wins: two processes marking *different*
//! ids can race and lose one update. The guarded protocol in
//! `crate::processor` already prevents two processes from claiming the *same*
//! id, so the race only widens the at-least-once refetch window.
//!
//! # Startup
//!
//! A missing or unreadable snapshot is non-fatal: the store starts empty with
//! a warning, accepting the risk of reprocessing items seen only in the lost
//! snapshot.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use super::atomic::write_atomic;
use crate::types::ItemId;

/// Default cap on the number of remembered item ids.
pub const DEFAULT_DEDUP_CAP: usize = 1000;

/// Errors that can occur while persisting the dedup snapshot.
#[derive(Debug, Error)]
pub enum DedupError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for dedup store operations.
pub type Result<T> = std::result::Result<T, DedupError>;

/// Capped, insertion-ordered set of already-claimed item ids.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    cap: usize,
    /// Insertion order, oldest at the front. Mirrors `seen`.
    order: VecDeque<ItemId>,
    seen: HashSet<ItemId>,
}

impl DedupStore {
    /// Loads the store from `path`, or starts empty if the snapshot is
    /// missing or unreadable.
    pub fn load(path: impl Into<PathBuf>, cap: usize) -> Self {
        let path = path.into();
        let ids = match Self::read_snapshot(&path) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load dedup snapshot, starting empty"
                );
                Vec::new()
            }
        };

        let mut store = DedupStore {
            path,
            cap,
            order: VecDeque::new(),
            seen: HashSet::new(),
        };
        // Re-inserting through the normal path enforces the cap, so a
        // snapshot written under a larger cap is truncated to the most
        // recent entries.
        for id in ids {
            store.insert(id);
        }
        store
    }

    fn read_snapshot(path: &Path) -> Result<Vec<ItemId>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Returns `true` if `id` has already been claimed and not yet evicted.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.seen.contains(id)
    }

    /// Records `id` as claimed and synchronously persists the full snapshot.
    ///
    /// Evicts the oldest entry when the cap is exceeded. Marking an id that
    /// is already present is a no-op (no reorder, no rewrite); the guarded
    /// protocol re-checks `contains` under the lock, so this path only occurs
    /// on direct store use.
    pub fn mark_processed(&mut self, id: &ItemId) -> Result<()> {
        if self.seen.contains(id) {
            return Ok(());
        }
        self.insert(id.clone());
        self.persist()
    }

    fn insert(&mut self, id: ItemId) {
        if self.seen.contains(&id) {
            return;
        }
        self.order.push_back(id.clone());
        self.seen.insert(id);
        while self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let ids: Vec<&ItemId> = self.order.iter().collect();
        let bytes = serde_json::to_vec(&ids)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no ids are remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
