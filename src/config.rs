//! Runtime configuration.
//!
//! Defaults suit a single-instance deployment with state under `./state`;
//! everything is overridable through `MAILWATCH_*` environment variables.
//! The dedup cap and lock staleness threshold are deliberately exposed:
//! deployments with busier mailboxes want a larger claim window, and slower
//! side-effect pipelines want a longer staleness threshold.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::lock::DEFAULT_STALE_AFTER;
use crate::store::DEFAULT_DEDUP_CAP;

/// Default HTTP listen address.
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

/// Default root for persisted state.
const DEFAULT_STATE_DIR: &str = "./state";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address. `MAILWATCH_BIND_ADDR`.
    pub bind_addr: SocketAddr,

    /// Root directory for persisted state. `MAILWATCH_STATE_DIR`.
    pub state_dir: PathBuf,

    /// Cap on the dedup set. `MAILWATCH_DEDUP_CAP`.
    pub dedup_cap: usize,

    /// Lock staleness threshold. `MAILWATCH_LOCK_STALE_SECS`.
    pub lock_stale_after: Duration,

    /// Base URL of the delta-fetch upstream. `MAILWATCH_UPSTREAM_URL`,
    /// required at startup.
    pub upstream_url: Option<String>,

    /// Downstream endpoint for the forwarding side effect.
    /// `MAILWATCH_FORWARD_URL`; forwarding is disabled when unset.
    pub forward_url: Option<String>,
}

impl Config {
    /// Creates a `Config` with default values.
    pub fn new() -> Self {
        Config {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            dedup_cap: DEFAULT_DEDUP_CAP,
            lock_stale_after: DEFAULT_STALE_AFTER,
            upstream_url: None,
            forward_url: None,
        }
    }

    /// Creates a `Config` from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::new();

        let bind_addr = std::env::var("MAILWATCH_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bind_addr);

        let state_dir = std::env::var("MAILWATCH_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);

        let dedup_cap = std::env::var("MAILWATCH_DEDUP_CAP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.dedup_cap);

        let lock_stale_after = std::env::var("MAILWATCH_LOCK_STALE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.lock_stale_after);

        Config {
            bind_addr,
            state_dir,
            dedup_cap,
            lock_stale_after,
            upstream_url: std::env::var("MAILWATCH_UPSTREAM_URL").ok(),
            forward_url: std::env::var("MAILWATCH_FORWARD_URL").ok(),
        }
    }

    /// Directory holding per-account cursor records.
    pub fn cursors_dir(&self) -> PathBuf {
        self.state_dir.join("cursors")
    }

    /// Path of the dedup snapshot.
    pub fn dedup_path(&self) -> PathBuf {
        self.state_dir.join("processed.json")
    }

    /// Directory holding item lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::new();

        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.state_dir, PathBuf::from("./state"));
        assert_eq!(config.dedup_cap, 1000);
        assert_eq!(config.lock_stale_after, Duration::from_secs(30));
        assert_eq!(config.upstream_url, None);
        assert_eq!(config.forward_url, None);
    }

    #[test]
    fn state_paths_hang_off_state_dir() {
        let mut config = Config::new();
        config.state_dir = PathBuf::from("/var/lib/mailwatch");

        assert_eq!(
            config.cursors_dir(),
            PathBuf::from("/var/lib/mailwatch/cursors")
        );
        assert_eq!(
            config.dedup_path(),
            PathBuf::from("/var/lib/mailwatch/processed.json")
        );
        assert_eq!(config.locks_dir(), PathBuf::from("/var/lib/mailwatch/locks"));
    }
}
