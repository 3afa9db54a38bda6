//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID kinds (e.g., using an
//! ItemId where an AccountKey is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored account, identified by its address (e.g., `a@x.com`).
///
/// Account keys name cursor record files on disk, so stores validate them
/// before use (see `store::cursor`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountKey(pub String);

impl AccountKey {
    pub fn new(s: impl Into<String>) -> Self {
        AccountKey(s.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountKey {
    fn from(s: &str) -> Self {
        AccountKey(s.to_string())
    }
}

/// An identifier for a single changed item within an account's stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(s: impl Into<String>) -> Self {
        ItemId(s.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

/// An opaque position in an account's change stream.
///
/// Cursors advance monotonically upstream; this crate only ever compares them
/// for equality. The delta between two cursors is resolved by the
/// `DeltaFetcher` collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(s: impl Into<String>) -> Self {
        Cursor(s.into())
    }

    /// Returns the cursor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Cursor(s.to_string())
    }
}

/// Identifies the process holding a lock, recorded for diagnosing
/// stale-lock takeovers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(s: impl Into<String>) -> Self {
        HolderId(s.into())
    }

    /// Builds a holder id for the current process (`<hostname>-<pid>`).
    pub fn for_process() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        HolderId(format!("{}-{}", host, std::process::id()))
    }

    /// Returns the holder id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        assert_eq!(AccountKey::from("a@x.com").to_string(), "a@x.com");
        assert_eq!(ItemId::from("m1").to_string(), "m1");
        assert_eq!(Cursor::from("100").to_string(), "100");
    }

    #[test]
    fn serde_is_transparent() {
        let key = AccountKey::from("a@x.com");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"a@x.com\"");

        let parsed: Cursor = serde_json::from_str("\"150\"").unwrap();
        assert_eq!(parsed, Cursor::from("150"));
    }

    #[test]
    fn holder_for_process_includes_pid() {
        let holder = HolderId::for_process();
        assert!(holder.as_str().ends_with(&std::process::id().to_string()));
    }
}
