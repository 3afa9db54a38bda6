//! Mailwatch - incremental mailbox change reconciliation.
//!
//! Turns at-least-once change notifications for monitored accounts into
//! at-most-once side effects per changed item, using a per-account cursor
//! store, a durable deduplication set, and cross-process item locks with
//! stale takeover. The upstream mail API and the downstream consumers sit
//! behind trait seams ([`fetch::DeltaFetcher`], [`effects::SideEffect`]).

pub mod config;
pub mod effects;
pub mod fetch;
pub mod lock;
pub mod processor;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod test_utils;
