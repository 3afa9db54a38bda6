//! Delta-fetch collaborator seam.
//!
//! The change processor never talks to the mailbox provider directly; it
//! asks a [`DeltaFetcher`] to resolve an open-closed cursor range
//! `(from, to]` into the ordered list of items that changed in it. The
//! provider-specific client (API shape, credentials) lives behind this
//! trait: the shipped [`HttpDeltaFetcher`] reaches an HTTP upstream, and tests
//! substitute scripted fetchers.
//!
//! A fetch must be idempotent over its range, not a consuming queue read:
//! the processor retries the same range on the next notification whenever a
//! cycle fails before the cursor advances.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountKey, Cursor, ItemId};

pub mod http;

pub use http::HttpDeltaFetcher;

/// A single changed item resolved from a delta.
///
/// Carries the payload the side effects need (for mail, typically sender,
/// subject and body fields), opaque to the reconciliation engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedItem {
    /// Identifier of the changed item.
    pub id: ItemId,

    /// Provider payload, passed through to side effects untouched.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChangedItem {
    pub fn new(id: impl Into<ItemId>, payload: serde_json::Value) -> Self {
        ChangedItem {
            id: id.into(),
            payload,
        }
    }
}

/// Errors surfaced by delta-fetch collaborators.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream request failed (connection, decode, provider error).
    #[error("upstream request failed: {0}")]
    Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The upstream answered but rejected the request.
    #[error("upstream rejected delta request with status {0}")]
    BadStatus(u16),
}

/// Resolves cursor ranges to changed items.
///
/// `from` is exclusive, `to` inclusive; an empty result is an explicit,
/// valid answer (nothing changed in the range).
#[async_trait]
pub trait DeltaFetcher: Send + Sync {
    async fn fetch(
        &self,
        account: &AccountKey,
        from: &Cursor,
        to: &Cursor,
    ) -> Result<Vec<ChangedItem>, FetchError>;
}
