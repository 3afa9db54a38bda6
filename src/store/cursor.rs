//! Per-account cursor records.
//!
//! Each monitored account has exactly one live record marking the last
//! position in its change stream that has been fully reconciled. Records are
//! overwritten in place (atomic replace) and never deleted, so the file count
//! is bounded by the number of monitored accounts.
//!
//! The change processor writes a record only after the whole delta up to that
//! cursor has been handled. A crash mid-delta leaves the old record, so the
//! same range is refetched on the next notification; per-item processing is
//! separately idempotent, which makes the refetch safe.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::atomic::write_atomic;
use super::is_safe_file_stem;
use crate::types::{AccountKey, Cursor};

/// Errors that can occur during cursor store operations.
#[derive(Debug, Error)]
pub enum CursorError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Account key unsafe to use as a filename.
    #[error("invalid account key: contains unsafe characters: {0}")]
    InvalidAccountKey(AccountKey),
}

/// Result type for cursor store operations.
pub type Result<T> = std::result::Result<T, CursorError>;

/// A persisted cursor record for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    /// The account this record belongs to.
    pub account: AccountKey,

    /// Last fully reconciled position in the account's change stream.
    pub cursor: Cursor,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Filesystem-backed cursor store.
///
/// Records live at `<dir>/<account>.json` and are written with the
/// atomic-replace pattern, so `set` is durable before it returns.
#[derive(Debug, Clone)]
pub struct CursorStore {
    dir: PathBuf,
}

impl CursorStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CursorStore { dir: dir.into() }
    }

    /// Returns the last reconciled cursor for `account`, or `None` if the
    /// account has never been observed.
    pub fn get(&self, account: &AccountKey) -> Result<Option<Cursor>> {
        Ok(self.record(account)?.map(|r| r.cursor))
    }

    /// Returns the full record for `account`, or `None` if absent.
    pub fn record(&self, account: &AccountKey) -> Result<Option<CursorRecord>> {
        let path = self.record_path(account)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CursorRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }

    /// Atomically replaces the stored cursor for `account`.
    ///
    /// Durable before returning: a crash after `set` returns never reverts
    /// the account to its previous cursor.
    pub fn set(&self, account: &AccountKey, cursor: &Cursor) -> Result<()> {
        let path = self.record_path(account)?;
        let record = CursorRecord {
            account: account.clone(),
            cursor: cursor.clone(),
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&path, &bytes)?;
        Ok(())
    }

    fn record_path(&self, account: &AccountKey) -> Result<PathBuf> {
        if !is_safe_file_stem(account.as_str()) {
            return Err(CursorError::InvalidAccountKey(account.clone()));
        }
        Ok(self.dir.join(format!("{}.json", account.as_str())))
    }

    /// Returns the directory records are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
