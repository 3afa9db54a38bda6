//! Forwarding resolved items to a downstream processor.
//!
//! POSTs each item as JSON to a configured endpoint (an analytics pipeline,
//! an extraction service, a spreadsheet bridge, whatever consumes new
//! mail). The downstream is trusted to do its own retries; a non-success
//! response is reported as a failure and the item is not re-sent.

use async_trait::async_trait;
use chrono::Utc;

use super::{EffectError, SideEffect};
use crate::fetch::ChangedItem;
use crate::types::AccountKey;

/// `SideEffect` that forwards items over HTTP.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpForwarder {
    /// Creates a forwarder POSTing to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpForwarder {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SideEffect for HttpForwarder {
    fn name(&self) -> &str {
        "forward"
    }

    async fn deliver(&self, account: &AccountKey, item: &ChangedItem) -> Result<(), EffectError> {
        let body = serde_json::json!({
            "account": account,
            "item_id": item.id,
            "payload": item.payload,
            "forwarded_at": Utc::now(),
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EffectError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
