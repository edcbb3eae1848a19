//! Events, markets and runners
//!
//! A market is one wagering surface of a sport event. Two-outcome markets
//! (Match-Odds, Bookmaker) settle by declaring a winning runner; fancy
//! markets carry a single line-runner and settle by declaring a score.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Market category. Each category carries its own odds encoding and payout
/// formula, dispatched in the exposure calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    /// Decimal odds, two runners. `win = stake * (odds - 1)` on a back.
    MatchOdds,
    /// Percentage odds, two runners. Effective multiplier `odds/100 + 1`.
    Bookmaker,
    /// Single score line; the line value doubles as a /100 payout rate.
    Fancy,
    /// Fancy variant where the quoted rate is a direct multiplier.
    FancyDirect,
}

impl MarketCategory {
    /// Two-outcome markets settle with `declare_winner`, line markets with
    /// `declare_score`.
    pub fn is_two_outcome(&self) -> bool {
        matches!(self, MarketCategory::MatchOdds | MarketCategory::Bookmaker)
    }

    pub fn is_fancy(&self) -> bool {
        !self.is_two_outcome()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::MatchOdds => "match_odds",
            MarketCategory::Bookmaker => "bookmaker",
            MarketCategory::Fancy => "fancy",
            MarketCategory::FancyDirect => "fancy_direct",
        }
    }
}

impl std::fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sport event grouping one or more markets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportEvent {
    pub id: Uuid,
    pub name: String,
    /// Event-level stake floor; narrows the market bounds when present.
    pub min_stake: Option<Decimal>,
    /// Event-level stake ceiling; narrows the market bounds when present.
    pub max_stake: Option<Decimal>,
    /// Set once every market of the event has a declared result.
    pub is_completed: bool,
}

/// One wagering surface of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    pub event_id: Uuid,
    pub category: MarketCategory,
    pub name: String,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Winning runner of a two-outcome market; `None` while open.
    pub winner_runner_id: Option<Uuid>,
}

impl Market {
    /// A two-outcome market is open until a winner is declared.
    pub fn is_settled(&self) -> bool {
        self.winner_runner_id.is_some()
    }
}

/// Trading state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Active,
    Inactive,
}

/// One selectable outcome of a market.
///
/// Exactly two per two-outcome market; one line-runner per fancy market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRunner {
    pub id: Uuid,
    pub market_id: Uuid,
    /// Key into the external odds feed.
    pub selection_id: i64,
    pub name: String,
    pub status: RunnerStatus,
    /// Declared score of a settled fancy runner; `None` while open.
    pub win_score: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl MarketRunner {
    pub fn is_active(&self) -> bool {
        matches!(self.status, RunnerStatus::Active)
    }

    pub fn is_settled(&self) -> bool {
        self.win_score.is_some()
    }
}
