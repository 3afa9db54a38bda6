//! Persistent state for the reconciliation engine.
//!
//! Two stores live here, both filesystem-backed and crash-safe via the
//! atomic-replace pattern in [`atomic`]:
//!
//! - [`cursor`]: the last reconciled position per account, one record file
//!   per account.
//! - [`dedup`]: the capped, insertion-ordered set of item ids already claimed
//!   for processing, persisted as a single snapshot file.
//!
//! Lock records are also filesystem-backed but live in the [`crate::lock`]
//! module, behind a capability trait, because they are protocol rather than
//! state: they exist only while an item is mid-claim.

pub mod atomic;
pub mod cursor;
pub mod dedup;

pub use cursor::{CursorError, CursorRecord, CursorStore};
pub use dedup::{DEFAULT_DEDUP_CAP, DedupError, DedupStore};

/// Checks that a string is safe to use as a file stem inside a store
/// directory.
///
/// Rejects empty strings, path separators, null bytes, and leading dots
/// (hidden files, `.` and `..` traversal). Account keys and item ids both
/// name files directly and go through this check.
pub(crate) fn is_safe_file_stem(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.contains('/') || s.contains('\\') || s.contains('\0') {
        return false;
    }
    if s.starts_with('.') {
        return false;
    }
    true
}
