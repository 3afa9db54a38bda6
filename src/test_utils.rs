//! Shared test utilities: scripted collaborators and wiring helpers.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::effects::{EffectError, SideEffect};
use crate::fetch::{ChangedItem, DeltaFetcher, FetchError};
use crate::lock::FsLockStore;
use crate::processor::ChangeProcessor;
use crate::store::{CursorStore, DedupStore};
use crate::types::{AccountKey, Cursor, HolderId};

/// A `DeltaFetcher` that returns a fixed delta and records every call.
pub struct ScriptedFetcher {
    delta: Vec<ChangedItem>,
    fail: bool,
    calls: Mutex<Vec<(AccountKey, Cursor, Cursor)>>,
}

impl ScriptedFetcher {
    /// Fetcher answering every range with `delta`.
    pub fn returning(delta: Vec<ChangedItem>) -> Self {
        ScriptedFetcher {
            delta,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fetcher failing every call with a 503.
    pub fn failing() -> Self {
        ScriptedFetcher {
            delta: Vec::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every `(account, from, to)` triple fetched so far.
    pub fn calls(&self) -> Vec<(AccountKey, Cursor, Cursor)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeltaFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        account: &AccountKey,
        from: &Cursor,
        to: &Cursor,
    ) -> Result<Vec<ChangedItem>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((account.clone(), from.clone(), to.clone()));
        if self.fail {
            return Err(FetchError::BadStatus(503));
        }
        Ok(self.delta.clone())
    }
}

/// A `SideEffect` that counts deliveries and optionally fails each one.
pub struct CountingEffect {
    name: &'static str,
    fail: bool,
    delivered: AtomicUsize,
}

impl CountingEffect {
    pub fn new(name: &'static str) -> Self {
        CountingEffect {
            name,
            fail: false,
            delivered: AtomicUsize::new(0),
        }
    }

    /// An effect that is invoked normally but reports failure every time.
    pub fn failing(name: &'static str) -> Self {
        CountingEffect {
            name,
            fail: true,
            delivered: AtomicUsize::new(0),
        }
    }

    /// Number of deliveries attempted against this effect.
    pub fn count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SideEffect for CountingEffect {
    fn name(&self) -> &str {
        self.name
    }

    async fn deliver(&self, _account: &AccountKey, _item: &ChangedItem) -> Result<(), EffectError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EffectError::Rejected(500));
        }
        Ok(())
    }
}

/// A changed item with a mail-shaped payload.
pub fn item(id: &str) -> ChangedItem {
    ChangedItem::new(
        id,
        serde_json::json!({"from": "cs@example.com", "subject": format!("item {id}")}),
    )
}

/// Wires a processor to the standard layout under `state_dir`, so multiple
/// processors built on the same directory share cursor, dedup, and lock
/// state like separate processes would.
pub fn build_processor(
    state_dir: &Path,
    fetcher: Arc<dyn DeltaFetcher>,
    effects: Vec<Arc<dyn SideEffect>>,
) -> ChangeProcessor {
    let cursors = CursorStore::new(state_dir.join("cursors"));
    let dedup = DedupStore::load(state_dir.join("processed.json"), 1000);
    let locks = FsLockStore::new(state_dir.join("locks"), Duration::from_secs(30));
    ChangeProcessor::new(
        cursors,
        dedup,
        Box::new(locks),
        fetcher,
        effects,
        HolderId::for_process(),
    )
}
