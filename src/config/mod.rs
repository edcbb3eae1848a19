//! Engine configuration
//!
//! Loaded from the environment (optionally via a `.env` file) the same way
//! the rest of the platform configures itself. Every knob has a serde
//! default so an empty environment yields a working engine.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single odds-feed call, in milliseconds. A slower
    /// feed surfaces as `MarketDataUnavailable`.
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,

    /// Internal retries of a commit that hit a version conflict before
    /// `ConcurrencyConflict` is surfaced to the caller.
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,

    /// Broadcast capacity for the notification channels.
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

fn default_feed_timeout_ms() -> u64 {
    3000
}

fn default_commit_retries() -> u32 {
    3
}

fn default_notify_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_timeout_ms: default_feed_timeout_ms(),
            commit_retries: default_commit_retries(),
            notify_capacity: default_notify_capacity(),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables prefixed `ENGINE_`
    /// (e.g. `ENGINE_FEED_TIMEOUT_MS=500`).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ENGINE"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }
}
