//! Side-effect collaborators invoked once per newly claimed item.
//!
//! Each effect is an independent delivery action. The change processor
//! invokes every configured effect for a claimed item and treats each result
//! in isolation: a failure is logged and never retried, never blocks the
//! other effects, and never unclaims the item. Effects therefore see an item
//! at most once.
//!
//! Shipped implementations:
//! - [`AlertLogger`] - structured-log alert per item.
//! - [`HttpForwarder`] - POSTs the resolved item to a downstream endpoint.

use async_trait::async_trait;
use thiserror::Error;

use crate::fetch::ChangedItem;
use crate::types::AccountKey;

pub mod alert;
pub mod forward;

pub use alert::AlertLogger;
pub use forward::HttpForwarder;

/// Errors a delivery action can report.
///
/// These are logged by the processor, not propagated; the type exists so
/// failures carry enough context to be diagnosed from the log alone.
#[derive(Debug, Error)]
pub enum EffectError {
    /// HTTP transport failure reaching the downstream.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The downstream answered but refused the item.
    #[error("downstream rejected item with status {0}")]
    Rejected(u16),
}

/// A single delivery action for resolved items.
#[async_trait]
pub trait SideEffect: Send + Sync {
    /// Stable name used in log fields to attribute failures.
    fn name(&self) -> &str;

    /// Delivers one item. Called at most once per item across all processes
    /// (while the item's dedup entry survives eviction).
    async fn deliver(&self, account: &AccountKey, item: &ChangedItem) -> Result<(), EffectError>;
}
