//! Wagers
//!
//! A bet is created `Running` by placement and only ever moves between
//! `Running` and `Won`/`Lost` through settlement and reversal. Potential
//! win/loss are fixed at placement time from the odds snapshot; once a bet
//! leaves `Running` they are immutable history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Back the runner to win, or lay it to lose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetSide {
    Back,
    Lay,
}

impl BetSide {
    pub fn is_back(&self) -> bool {
        matches!(self, BetSide::Back)
    }
}

impl std::fmt::Display for BetSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BetSide::Back => write!(f, "back"),
            BetSide::Lay => write!(f, "lay"),
        }
    }
}

/// Order lifecycle state. Void bets are excluded from every calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Void,
}

/// Settlement state of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Running,
    Won,
    Lost,
}

/// A wager against a market runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub event_id: Uuid,
    pub runner_id: Uuid,
    pub side: BetSide,
    pub odds: Decimal,
    pub stake: Decimal,
    /// Amount credited if the bet wins; always positive.
    pub potential_win: Decimal,
    /// Amount debited if the bet loses; always <= 0.
    pub potential_loss: Decimal,
    pub order_status: OrderStatus,
    pub result_status: ResultStatus,
    /// Zero while running; `potential_win` or `potential_loss` once settled.
    pub realized_pl: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    pub fn is_running(&self) -> bool {
        self.order_status == OrderStatus::Placed && self.result_status == ResultStatus::Running
    }

    pub fn is_settled(&self) -> bool {
        self.order_status == OrderStatus::Placed
            && matches!(self.result_status, ResultStatus::Won | ResultStatus::Lost)
    }

    /// Transition to a settled state, realizing the corresponding payout.
    pub fn settle(&mut self, won: bool) {
        if won {
            self.result_status = ResultStatus::Won;
            self.realized_pl = self.potential_win;
        } else {
            self.result_status = ResultStatus::Lost;
            self.realized_pl = self.potential_loss;
        }
    }

    /// Put a settled bet back in the running state.
    pub fn unsettle(&mut self) {
        self.result_status = ResultStatus::Running;
        self.realized_pl = Decimal::ZERO;
    }
}
