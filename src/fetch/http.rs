//! HTTP client for the upstream delta endpoint.
//!
//! Expects an upstream exposing
//! `GET <base>/delta?account=<key>&from=<cursor>&to=<cursor>` and answering
//! with a JSON array of [`ChangedItem`]s, ordered by position in the change
//! stream. The upstream owns the provider API and its credential handshake;
//! this client only speaks the range protocol.

use async_trait::async_trait;

use super::{ChangedItem, DeltaFetcher, FetchError};
use crate::types::{AccountKey, Cursor};

/// `DeltaFetcher` backed by an HTTP upstream.
#[derive(Debug, Clone)]
pub struct HttpDeltaFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeltaFetcher {
    /// Creates a fetcher for the given upstream base URL (no trailing
    /// slash required).
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpDeltaFetcher {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn delta_url(&self) -> String {
        format!("{}/delta", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DeltaFetcher for HttpDeltaFetcher {
    async fn fetch(
        &self,
        account: &AccountKey,
        from: &Cursor,
        to: &Cursor,
    ) -> Result<Vec<ChangedItem>, FetchError> {
        let response = self
            .client
            .get(self.delta_url())
            .query(&[
                ("account", account.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Upstream(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let items = response
            .json::<Vec<ChangedItem>>()
            .await
            .map_err(|e| FetchError::Upstream(Box::new(e)))?;
        Ok(items)
    }
}
