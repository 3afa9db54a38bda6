//! Structured-log alerts for newly observed items.

use async_trait::async_trait;
use tracing::info;

use super::{EffectError, SideEffect};
use crate::fetch::ChangedItem;
use crate::types::AccountKey;

/// Emits one `tracing` event per delivered item.
///
/// The cheapest useful effect: operators tailing the log see every
/// newly-claimed item with its account and, when the payload carries them,
/// the sender and subject.
#[derive(Debug, Clone, Default)]
pub struct AlertLogger;

impl AlertLogger {
    pub fn new() -> Self {
        AlertLogger
    }
}

#[async_trait]
impl SideEffect for AlertLogger {
    fn name(&self) -> &str {
        "alert"
    }

    async fn deliver(&self, account: &AccountKey, item: &ChangedItem) -> Result<(), EffectError> {
        let from = item.payload.get("from").and_then(|v| v.as_str());
        let subject = item.payload.get("subject").and_then(|v| v.as_str());

        info!(
            account = %account,
            item = %item.id,
            from = from.unwrap_or("-"),
            subject = subject.unwrap_or("-"),
            "new item observed"
        );
        Ok(())
    }
}
