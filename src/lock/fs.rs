//! Filesystem-backed item locks.
//!
//! Each held lock is a file at `<dir>/<item>.lock` containing a JSON
//! [`LockRecord`] with the holder and acquisition time. Exclusivity comes
//! from `O_CREAT | O_EXCL` (`create_new`): when two acquirers race for a free
//! item, the filesystem picks exactly one winner.
//!
//! # Stale takeover
//!
//! A record older than the staleness threshold is presumed abandoned. An
//! acquirer finding one removes it and then competes for the exclusive
//! create as usual: two takeover attempts can both remove the stale file,
//! but only one wins the subsequent `create_new`.
//!
//! A record that cannot be parsed is judged by file mtime instead: the
//! creation and the record write are separate syscalls, so a concurrent
//! acquirer can observe a freshly created but not-yet-written file. Only an
//! unreadable file older than the threshold is debris from a crashed holder.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ItemLock, LockError, Result};
use crate::store::atomic::{fsync_dir, fsync_file};
use crate::store::is_safe_file_stem;
use crate::types::{HolderId, ItemId};

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Process that acquired the lock.
    pub holder: HolderId,

    /// When the lock was acquired; staleness is judged against this, not
    /// file mtime, so the record survives filesystem timestamp quirks.
    pub acquired_at: DateTime<Utc>,
}

/// Lock manager backed by exclusive file creation in a single directory.
#[derive(Debug)]
pub struct FsLockStore {
    dir: PathBuf,
    stale_after: Duration,
}

impl FsLockStore {
    /// Creates a lock store rooted at `dir` with the given staleness
    /// threshold. The directory is created lazily on first acquisition.
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        FsLockStore {
            dir: dir.into(),
            stale_after,
        }
    }

    fn lock_path(&self, item: &ItemId) -> Result<PathBuf> {
        if !is_safe_file_stem(item.as_str()) {
            return Err(LockError::InvalidItemId(item.clone()));
        }
        Ok(self.dir.join(format!("{}.lock", item.as_str())))
    }

    /// Reads the record at `path`, returning `None` if the file vanished
    /// (lost a race with a release or takeover).
    fn read_record(path: &Path) -> Result<Option<LockRecord>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes).ok())
    }

    fn is_stale(&self, record: &LockRecord) -> bool {
        let age = (Utc::now() - record.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age > self.stale_after
    }

    /// Staleness for a lock file whose record could not be parsed, judged by
    /// mtime. A missing file (lost a race with release or takeover) counts
    /// as stale: the subsequent exclusive create arbitrates.
    fn is_stale_by_mtime(&self, path: &Path) -> Result<bool> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let age = metadata
            .modified()?
            .elapsed()
            .unwrap_or(Duration::ZERO);
        Ok(age > self.stale_after)
    }

    /// Removes the lock file, ignoring "not found" (someone else got there
    /// first).
    fn remove_lock_file(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ItemLock for FsLockStore {
    fn try_acquire(&self, item: &ItemId, holder: &HolderId) -> Result<bool> {
        let path = self.lock_path(item)?;
        std::fs::create_dir_all(&self.dir)?;

        // An existing record blocks acquisition unless it is stale, in which
        // case it is removed before competing for the exclusive create below.
        // A fresh lock created between the staleness check and the removal
        // can be lost here; the window is accepted, matching the
        // liveness-over-safety tradeoff of takeover itself.
        if path.exists() {
            match Self::read_record(&path)? {
                Some(record) if !self.is_stale(&record) => return Ok(false),
                Some(record) => {
                    debug!(
                        item = %item,
                        previous_holder = %record.holder,
                        "taking over stale lock"
                    );
                    self.remove_lock_file(&path)?;
                }
                None if !self.is_stale_by_mtime(&path)? => return Ok(false),
                None => self.remove_lock_file(&path)?,
            }
        }

        let record = LockRecord {
            holder: holder.clone(),
            acquired_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Lost the race to another acquirer.
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes)?;
        fsync_file(&file)?;
        drop(file);
        fsync_dir(&self.dir)?;

        Ok(true)
    }

    fn release(&self, item: &ItemId) -> Result<()> {
        let path = self.lock_path(item)?;
        self.remove_lock_file(&path)?;
        if self.dir.exists() {
            fsync_dir(&self.dir)?;
        }
        Ok(())
    }

    fn sweep_stale(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "lock") {
                continue;
            }

            let stale = match Self::read_record(&path)? {
                Some(record) => self.is_stale(&record),
                // Unreadable record: debris from a crashed holder, unless it
                // was created moments ago by a live acquirer.
                None => self.is_stale_by_mtime(&path)?,
            };
            if stale {
                warn!(path = %path.display(), "removing stale lock left by a previous run");
                self.remove_lock_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            fsync_dir(&self.dir)?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> FsLockStore {
        FsLockStore::new(dir, Duration::from_secs(30))
    }

    fn holder(n: u32) -> HolderId {
        HolderId::new(format!("proc-{n}"))
    }

    /// Writes a lock record with a back-dated acquisition time, simulating a
    /// holder that stopped without releasing.
    fn plant_lock(dir: &Path, item: &ItemId, age: chrono::Duration) {
        let record = LockRecord {
            holder: holder(99),
            acquired_at: Utc::now() - age,
        };
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.lock", item.as_str())),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn first_acquire_succeeds_second_fails() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());
        let item = ItemId::from("m1");

        assert!(locks.try_acquire(&item, &holder(1)).unwrap());
        assert!(!locks.try_acquire(&item, &holder(2)).unwrap());
    }

    #[test]
    fn release_makes_item_acquirable_again() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());
        let item = ItemId::from("m1");

        assert!(locks.try_acquire(&item, &holder(1)).unwrap());
        locks.release(&item).unwrap();
        assert!(locks.try_acquire(&item, &holder(2)).unwrap());
    }

    #[test]
    fn release_of_absent_lock_is_not_an_error() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        locks.release(&ItemId::from("never-held")).unwrap();
    }

    #[test]
    fn distinct_items_do_not_contend() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        assert!(locks.try_acquire(&ItemId::from("m1"), &holder(1)).unwrap());
        assert!(locks.try_acquire(&ItemId::from("m2"), &holder(1)).unwrap());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());
        let item = ItemId::from("m1");

        plant_lock(dir.path(), &item, chrono::Duration::seconds(60));

        assert!(locks.try_acquire(&item, &holder(1)).unwrap());

        // The record now names the new holder.
        let path = dir.path().join("m1.lock");
        let record: LockRecord =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(record.holder, holder(1));
    }

    #[test]
    fn fresh_lock_is_not_taken_over() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());
        let item = ItemId::from("m1");

        plant_lock(dir.path(), &item, chrono::Duration::seconds(5));

        assert!(!locks.try_acquire(&item, &holder(1)).unwrap());
    }

    #[test]
    fn fresh_unreadable_record_blocks_acquisition() {
        // A just-created lock file whose record write has not landed yet
        // must not be stolen.
        let dir = tempdir().unwrap();
        let locks = store(dir.path());
        let item = ItemId::from("m1");

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("m1.lock"), b"").unwrap();

        assert!(!locks.try_acquire(&item, &holder(1)).unwrap());
    }

    #[test]
    fn old_unreadable_record_is_treated_as_stale() {
        let dir = tempdir().unwrap();
        let locks = FsLockStore::new(dir.path(), Duration::from_millis(50));
        let item = ItemId::from("m1");

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("m1.lock"), b"garbage{").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert!(locks.try_acquire(&item, &holder(1)).unwrap());
    }

    #[test]
    fn two_stores_on_one_directory_exclude_each_other() {
        // Two store instances simulate two processes sharing the directory.
        let dir = tempdir().unwrap();
        let a = store(dir.path());
        let b = store(dir.path());
        let item = ItemId::from("m1");

        assert!(a.try_acquire(&item, &holder(1)).unwrap());
        assert!(!b.try_acquire(&item, &holder(2)).unwrap());

        a.release(&item).unwrap();
        assert!(b.try_acquire(&item, &holder(2)).unwrap());
    }

    #[test]
    fn sweep_removes_only_stale_locks() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        plant_lock(dir.path(), &ItemId::from("old1"), chrono::Duration::seconds(120));
        plant_lock(dir.path(), &ItemId::from("old2"), chrono::Duration::seconds(45));
        plant_lock(dir.path(), &ItemId::from("fresh"), chrono::Duration::seconds(2));

        let removed = locks.sweep_stale().unwrap();
        assert_eq!(removed, 2);

        assert!(!dir.path().join("old1.lock").exists());
        assert!(!dir.path().join("old2.lock").exists());
        assert!(dir.path().join("fresh.lock").exists());
    }

    #[test]
    fn sweep_removes_old_unreadable_records() {
        let dir = tempdir().unwrap();
        let locks = FsLockStore::new(dir.path(), Duration::from_millis(50));

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.lock"), b"").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(locks.sweep_stale().unwrap(), 1);
    }

    #[test]
    fn sweep_keeps_fresh_unreadable_records() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("inflight.lock"), b"").unwrap();

        assert_eq!(locks.sweep_stale().unwrap(), 0);
        assert!(dir.path().join("inflight.lock").exists());
    }

    #[test]
    fn sweep_on_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let locks = store(&dir.path().join("never-created"));

        assert_eq!(locks.sweep_stale().unwrap(), 0);
    }

    #[test]
    fn sweep_ignores_non_lock_files() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(locks.sweep_stale().unwrap(), 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn rejects_unsafe_item_ids() {
        let dir = tempdir().unwrap();
        let locks = store(dir.path());

        for bad in ["../../etc/passwd", "", ".hidden"] {
            let result = locks.try_acquire(&ItemId::from(bad), &holder(1));
            assert!(
                matches!(result, Err(LockError::InvalidItemId(_))),
                "expected rejection for {bad:?}"
            );
        }
    }

    proptest! {
        /// Acquire/release roundtrip: after a release, any holder can
        /// acquire, and a held lock refuses all comers.
        #[test]
        fn acquire_release_roundtrip(name in "[a-z0-9]{1,16}") {
            let dir = tempdir().unwrap();
            let locks = store(dir.path());
            let item = ItemId::from(name.as_str());

            prop_assert!(locks.try_acquire(&item, &holder(1)).unwrap());
            prop_assert!(!locks.try_acquire(&item, &holder(2)).unwrap());
            locks.release(&item).unwrap();
            prop_assert!(locks.try_acquire(&item, &holder(2)).unwrap());
        }
    }

    // ─── Cross-thread exclusion ───

    #[test]
    fn concurrent_acquirers_produce_exactly_one_winner() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempdir().unwrap();
        let locks = Arc::new(store(dir.path()));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let locks = Arc::clone(&locks);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if locks
                        .try_acquire(&ItemId::from("contested"), &holder(n))
                        .unwrap()
                    {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
