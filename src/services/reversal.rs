//! Settlement reversal
//!
//! The structural inverse of settlement, built on the same per-category
//! formulas so the two can never drift: settled wagers return to the
//! running state, the exposure they imply is re-reserved, and the P/L that
//! was cascaded up the ownership chain is applied in reverse. The declared
//! winner or score is cleared and a completed event reopens.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Bet, User};
use crate::store::{LedgerBatch, LedgerWrite};

use super::exposure;
use super::ExchangeEngine;

impl ExchangeEngine {
    /// Undo a declared result, restoring every affected wager, user and
    /// ancestor to their pre-settlement state.
    pub async fn revert_result(&self, market_id: Uuid) -> Result<(), EngineError> {
        let mut attempt = 0;
        loop {
            match self.try_revert_result(market_id).await {
                Err(EngineError::ConcurrencyConflict)
                    if attempt < self.config().commit_retries =>
                {
                    attempt += 1;
                    tracing::warn!(market = %market_id, attempt, "reversal conflict, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_revert_result(&self, market_id: Uuid) -> Result<(), EngineError> {
        let _market_guard = self.locks().write_market(market_id).await;

        let market = self.require_market(market_id).await?;
        let runners = self.store().market_runners(market.id).await?;
        let runner_ids: Vec<Uuid> = runners.iter().map(|r| r.id).collect();

        // Writes that clear the declared result.
        let mut clear_writes: Vec<LedgerWrite> = Vec::new();
        if market.category.is_two_outcome() {
            if market.winner_runner_id.is_none() {
                return Err(EngineError::ResultNotDeclared);
            }
            clear_writes.push(LedgerWrite::SetMarketWinner {
                market_id: market.id,
                winner_runner_id: None,
            });
        } else {
            let settled: Vec<&_> = runners.iter().filter(|r| r.is_settled()).collect();
            if settled.is_empty() {
                return Err(EngineError::ResultNotDeclared);
            }
            for runner in settled {
                clear_writes.push(LedgerWrite::SetRunnerWinScore {
                    runner_id: runner.id,
                    win_score: None,
                });
            }
        }

        let mut by_user: BTreeMap<Uuid, Vec<Bet>> = BTreeMap::new();
        for bet in self.store().market_settled_bets(market.id).await? {
            by_user.entry(bet.user_id).or_default().push(bet);
        }

        let mut to_lock: Vec<(Uuid, crate::models::Role)> = Vec::new();
        let mut chains: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for user_id in by_user.keys() {
            let user = self.require_user(*user_id).await?;
            to_lock.push((user.id, user.role));
            let ancestors = self.resolve_ancestors(&user).await?;
            chains.insert(user.id, ancestors.iter().map(|a| a.id).collect());
            for ancestor in &ancestors {
                to_lock.push((ancestor.id, ancestor.role));
            }
        }

        let _guards = self.locks().lock_users_ordered(&mut to_lock).await;

        let mut users: HashMap<Uuid, User> = HashMap::new();
        for (user_id, _) in &to_lock {
            users.insert(*user_id, self.require_user(*user_id).await?);
        }

        let mut batch = LedgerBatch::new();
        let mut restored_users: Vec<User> = Vec::new();
        let mut ancestor_pl: BTreeMap<Uuid, Decimal> = BTreeMap::new();

        for (user_id, user_bets) in &by_user {
            // Settled P/L about to be taken back.
            let prev_pl: Decimal = user_bets.iter().map(|b| b.realized_pl).sum();

            let mut restored = Vec::with_capacity(user_bets.len());
            for bet in user_bets {
                let mut running = bet.clone();
                running.unsettle();
                batch.push(LedgerWrite::UpdateBet(running.clone()));
                restored.push(running);
            }

            // Re-reserve exposure as if the wagers were freshly placed,
            // with the same formulas settlement released it through.
            let re_required =
                exposure::market_required(market.category, &restored, &runner_ids);

            let user = &users[user_id];
            let mut updated = user.clone();
            updated.exposure += re_required;
            updated.balance -= prev_pl;
            updated.realized_pl -= prev_pl;
            batch.push(LedgerWrite::PutUser {
                user: updated.clone(),
                expected_version: user.version,
            });
            tracing::debug!(user = %user_id, pl = %prev_pl, reserved = %re_required,
                "reverting user book");
            restored_users.push(updated);

            for ancestor_id in &chains[user_id] {
                *ancestor_pl.entry(*ancestor_id).or_default() += prev_pl;
            }
        }

        let mut updated_ancestors: Vec<User> = Vec::new();
        for (ancestor_id, pl) in &ancestor_pl {
            let ancestor = &users[ancestor_id];
            let mut updated = ancestor.clone();
            updated.balance -= *pl;
            updated.realized_pl -= *pl;
            batch.push(LedgerWrite::PutUser {
                user: updated.clone(),
                expected_version: ancestor.version,
            });
            updated_ancestors.push(updated);
        }

        for write in clear_writes {
            batch.push(write);
        }

        let event = self.require_event(market.event_id).await?;
        if event.is_completed {
            batch.push(LedgerWrite::SetEventCompleted {
                event_id: event.id,
                is_completed: false,
            });
        }

        self.store().commit(batch).await?;

        for user in &restored_users {
            self.notify_user(user);
            self.notify_event_bets(user, market.event_id).await;
        }
        for ancestor in &updated_ancestors {
            self.notify_user(ancestor);
        }

        tracing::info!(market = %market.id, "result reverted");
        Ok(())
    }
}
