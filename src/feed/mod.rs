//! Odds feed gateway interface
//!
//! Placement validates the requested price against a snapshot fetched from
//! the live feed immediately before computing the payout. The feed call is
//! bounded by [`EngineConfig::feed_timeout`](crate::config::EngineConfig);
//! absence of the requested price from a returned ladder is a normal
//! outcome (stale price), not a feed error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feed transport/availability errors. All of them surface to engine
/// callers as `MarketDataUnavailable`.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("odds feed timed out")]
    Timeout,
    #[error("selection {0} missing from feed")]
    UnknownSelection(i64),
    #[error("odds feed error: {0}")]
    Upstream(String),
}

/// Current back/lay ladder of one runner in a two-outcome market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerLadder {
    /// Feed-side runner key, matched against `MarketRunner::selection_id`.
    pub selection_id: i64,
    /// Available back prices, best first.
    pub back: Vec<Decimal>,
    /// Available lay prices, best first.
    pub lay: Vec<Decimal>,
}

impl RunnerLadder {
    /// Whether `odds` is currently quoted on the given side.
    pub fn quotes(&self, is_back: bool, odds: Decimal) -> bool {
        let side = if is_back { &self.back } else { &self.lay };
        side.contains(&odds)
    }
}

/// Current line of a fancy runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FancyLine {
    pub selection_id: i64,
    /// Line quoted for back (yes) wagers.
    pub back_line: Decimal,
    /// Line quoted for lay (no) wagers.
    pub lay_line: Decimal,
    /// Runner-level stake floor; overrides market and event bounds.
    pub min_stake: Option<Decimal>,
    /// Runner-level stake ceiling; overrides market and event bounds.
    pub max_stake: Option<Decimal>,
}

impl FancyLine {
    pub fn quotes(&self, is_back: bool, odds: Decimal) -> bool {
        if is_back {
            self.back_line == odds
        } else {
            self.lay_line == odds
        }
    }
}

/// Live odds source seam.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Full price ladder for a two-outcome market.
    async fn price_ladder(&self, market_id: Uuid) -> Result<Vec<RunnerLadder>, FeedError>;

    /// Current line for a fancy runner.
    async fn fancy_line(
        &self,
        market_id: Uuid,
        selection_id: i64,
    ) -> Result<FancyLine, FeedError>;
}
