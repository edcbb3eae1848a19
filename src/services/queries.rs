//! Read-side queries
//!
//! Derived views over the ledger for the transport layer: account
//! snapshots, the per-runner P/L book a market's open wagers imply, and
//! event-wide exposure. All reads are lock-free; a caller racing a
//! settlement simply sees the state from one side of the commit.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::EngineError;
use crate::notify::UserSnapshot;

use super::exposure::{self, RunnerPl};
use super::ExchangeEngine;

impl ExchangeEngine {
    /// Current balance, exposure and available funds for one account.
    pub async fn user_exposure_snapshot(
        &self,
        user_id: Uuid,
    ) -> Result<UserSnapshot, EngineError> {
        let user = self.require_user(user_id).await?;
        Ok(Self::snapshot_of(&user))
    }

    /// The net P/L each runner's victory would realize for the user, from
    /// their running wagers in one market.
    ///
    /// On a fancy market there is no cross-runner book; each runner's entry
    /// carries the worst-case loss of the wagers on that runner, as a
    /// non-positive figure.
    pub async fn market_runner_pl(
        &self,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<Vec<RunnerPl>, EngineError> {
        let market = self.require_market(market_id).await?;
        let runners = self.store().market_runners(market.id).await?;
        let bets = self.store().running_bets(user_id, market.id).await?;

        if market.category.is_two_outcome() {
            let runner_ids: Vec<Uuid> = runners.iter().map(|r| r.id).collect();
            return Ok(exposure::runner_book(&bets, &runner_ids));
        }

        let book = runners
            .iter()
            .map(|runner| {
                let runner_bets: Vec<_> = bets
                    .iter()
                    .filter(|b| b.runner_id == runner.id)
                    .cloned()
                    .collect();
                RunnerPl {
                    runner_id: runner.id,
                    pl: -exposure::line_required(&runner_bets),
                }
            })
            .collect();
        Ok(book)
    }

    /// The user's total capital-at-risk across every market of an event.
    pub async fn event_exposure(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Decimal, EngineError> {
        self.require_event(event_id).await?;
        self.event_exposure_of(user_id, event_id).await
    }
}
