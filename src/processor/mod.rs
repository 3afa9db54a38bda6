//! Notification handling and the guarded per-item protocol.
//!
//! The processor turns an at-least-once stream of "account X advanced to
//! cursor Y" notifications into at-most-once side effects per item, using
//! three cooperating pieces of durable state:
//!
//! - the cursor store bounds *what to fetch* (the open-closed range between
//!   the stored and incoming cursors);
//! - the dedup store remembers *what was already claimed*;
//! - the item lock serializes *who claims*, across processes.
//!
//! # Cursor policy
//!
//! No stored cursor: the incoming value becomes the baseline, nothing is
//! fetched. Stored equals incoming: duplicate notification, no-op. Anything
//! else: fetch `(stored, incoming]`, run every item through the guarded
//! protocol, and only then store the incoming cursor. A crash
//! mid-delta refetches the same range on the next notification; item
//! claiming makes the refetch safe.
//!
//! # Guarded per-item protocol
//!
//! ```text
//! contains? ── yes ──▶ skip
//!    │ no
//! try_acquire ── held ──▶ skip
//!    │ acquired
//! contains? ── yes ──▶ skip (re-check closes the race with other claimers)
//!    │ no
//! mark_processed        (claim recorded BEFORE any side effect)
//!    │
//! run each side effect independently
//!    │
//! release (guard drop, on every path above)
//! ```
//!
//! Per item the state machine is `Unseen → Claimed → Done`, irreversible: a
//! crash between claim and side effects leaves the item permanently
//! considered handled. That is the chosen tradeoff: at-most-once, never
//! duplicate alerts.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::effects::SideEffect;
use crate::fetch::{ChangedItem, DeltaFetcher, FetchError};
use crate::lock::{ItemLock, acquire_scoped};
use crate::store::cursor::CursorError;
use crate::store::dedup::DedupError;
use crate::store::{CursorStore, DedupStore};
use crate::types::{AccountKey, Cursor, HolderId, ItemId};


/// Errors that abort a reconciliation cycle.
///
/// Per-item store failures do not appear here: they degrade to skips so one
/// bad item cannot wedge the rest of the delta.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Cursor store failure; the cycle cannot even establish its range.
    #[error("cursor store error: {0}")]
    Cursor(#[from] CursorError),

    /// Delta fetch failed; the cursor is not advanced and the same range is
    /// retried on the next notification.
    #[error("delta fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// What a notification amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// First observation of the account: cursor stored, nothing fetched.
    Baseline,

    /// Stored cursor already equals the incoming one.
    Duplicate,

    /// A delta was fetched and handled; the cursor advanced.
    Reconciled {
        /// Items in the fetched delta.
        total: usize,
        /// Items this invocation claimed and side-effected.
        processed: usize,
    },
}

/// What happened to a single item of a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Claimed here; side effects ran (each independently).
    Processed,

    /// Not touched; see the reason.
    Skipped(SkipReason),
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The dedup store already contains the id.
    AlreadyProcessed,

    /// Another process holds the item's lock right now.
    Locked,

    /// A dedup or lock store failure prevented a safe claim this cycle.
    StoreUnavailable,
}

/// The reconciliation engine. One instance per process, shared across
/// notification tasks; safe for concurrent use.
pub struct ChangeProcessor {
    cursors: CursorStore,
    dedup: Mutex<DedupStore>,
    locks: Box<dyn ItemLock>,
    fetcher: Arc<dyn DeltaFetcher>,
    effects: Vec<Arc<dyn SideEffect>>,
    holder: HolderId,
}

impl ChangeProcessor {
    pub fn new(
        cursors: CursorStore,
        dedup: DedupStore,
        locks: Box<dyn ItemLock>,
        fetcher: Arc<dyn DeltaFetcher>,
        effects: Vec<Arc<dyn SideEffect>>,
        holder: HolderId,
    ) -> Self {
        ChangeProcessor {
            cursors,
            dedup: Mutex::new(dedup),
            locks,
            fetcher,
            effects,
            holder,
        }
    }

    /// Handles one change notification for `account`.
    ///
    /// Returns an error only when the cycle as a whole failed (cursor store
    /// or delta fetch); in that case the cursor has not advanced and the
    /// same range will be re-resolved on the next notification.
    pub async fn handle_notification(
        &self,
        account: &AccountKey,
        incoming: &Cursor,
    ) -> Result<NotificationOutcome> {
        let stored = match self.cursors.get(account)? {
            None => {
                // First observation: the incoming cursor is the baseline.
                // Items before it were never promised to anyone.
                self.cursors.set(account, incoming)?;
                info!(account = %account, cursor = %incoming, "account baselined");
                return Ok(NotificationOutcome::Baseline);
            }
            Some(stored) if stored == *incoming => {
                debug!(account = %account, cursor = %incoming, "duplicate notification");
                return Ok(NotificationOutcome::Duplicate);
            }
            Some(stored) => stored,
        };

        let delta = self.fetcher.fetch(account, &stored, incoming).await?;
        let total = delta.len();
        debug!(
            account = %account,
            from = %stored,
            to = %incoming,
            total,
            "delta fetched"
        );

        let mut processed = 0;
        for item in &delta {
            if self.process_item(account, item).await == ItemOutcome::Processed {
                processed += 1;
            }
        }

        // The cursor advances only after the whole delta is handled.
        self.cursors.set(account, incoming)?;
        info!(
            account = %account,
            cursor = %incoming,
            total,
            processed,
            "delta reconciled"
        );

        Ok(NotificationOutcome::Reconciled { total, processed })
    }

    /// Runs one item through the guarded protocol.
    ///
    /// Never fails: store trouble degrades to
    /// `Skipped(StoreUnavailable)` so the rest of the delta proceeds.
    pub async fn process_item(&self, account: &AccountKey, item: &ChangedItem) -> ItemOutcome {
        if self.dedup_contains(&item.id) {
            return ItemOutcome::Skipped(SkipReason::AlreadyProcessed);
        }

        let guard = match acquire_scoped(self.locks.as_ref(), &item.id, &self.holder) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(item = %item.id, "item locked elsewhere, skipping");
                return ItemOutcome::Skipped(SkipReason::Locked);
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "could not claim item, skipping this cycle");
                return ItemOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };

        // Re-check under the lock: another claimer may have marked the item
        // between the cheap check above and our acquisition.
        if self.dedup_contains(&item.id) {
            drop(guard);
            return ItemOutcome::Skipped(SkipReason::AlreadyProcessed);
        }

        // Claim before any side effect runs. From here the item is
        // permanently considered handled, crash or not.
        if let Err(e) = self.mark_processed(&item.id) {
            warn!(item = %item.id, error = %e, "could not record claim, skipping this cycle");
            drop(guard);
            return ItemOutcome::Skipped(SkipReason::StoreUnavailable);
        }

        for effect in &self.effects {
            if let Err(e) = effect.deliver(account, item).await {
                error!(
                    account = %account,
                    item = %item.id,
                    effect = effect.name(),
                    error = %e,
                    "side effect failed"
                );
            }
        }

        drop(guard);
        ItemOutcome::Processed
    }

    fn dedup_contains(&self, id: &ItemId) -> bool {
        let dedup = self.dedup.lock().unwrap_or_else(PoisonError::into_inner);
        dedup.contains(id)
    }

    fn mark_processed(&self, id: &ItemId) -> std::result::Result<(), DedupError> {
        let mut dedup = self.dedup.lock().unwrap_or_else(PoisonError::into_inner);
        dedup.mark_processed(id)
    }
}
