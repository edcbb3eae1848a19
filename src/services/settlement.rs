//! Settlement
//!
//! Two state machines selected by market category: two-outcome markets
//! settle by declaring a winning runner, fancy markets by declaring a
//! winning score against the line. Both realize every running wager,
//! release the exposure those wagers consumed, and cascade the realized
//! P/L up the ownership chain, excluding the root owner. The whole
//! settlement commits as one atomic ledger batch; version conflicts retry
//! the operation from scratch.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Bet, Market, User};
use crate::store::{LedgerBatch, LedgerWrite};

use super::exposure;
use super::ExchangeEngine;

impl ExchangeEngine {
    /// Declare the winning runner of a two-outcome market.
    pub async fn declare_winner(
        &self,
        market_id: Uuid,
        winning_runner_id: Uuid,
    ) -> Result<(), EngineError> {
        let mut attempt = 0;
        loop {
            match self.try_declare_winner(market_id, winning_runner_id).await {
                Err(EngineError::ConcurrencyConflict)
                    if attempt < self.config().commit_retries =>
                {
                    attempt += 1;
                    tracing::warn!(market = %market_id, attempt, "settlement conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Declare the winning score of a fancy runner. Back wagers win when
    /// their line is at or under the score, lay wagers when it is over.
    pub async fn declare_score(
        &self,
        market_id: Uuid,
        runner_id: Uuid,
        win_score: Decimal,
    ) -> Result<(), EngineError> {
        let mut attempt = 0;
        loop {
            match self.try_declare_score(market_id, runner_id, win_score).await {
                Err(EngineError::ConcurrencyConflict)
                    if attempt < self.config().commit_retries =>
                {
                    attempt += 1;
                    tracing::warn!(market = %market_id, attempt, "settlement conflict, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_declare_winner(
        &self,
        market_id: Uuid,
        winning_runner_id: Uuid,
    ) -> Result<(), EngineError> {
        // Exclusive market guard: no placement can interleave with the
        // settlement of this market.
        let _market_guard = self.locks().write_market(market_id).await;

        let market = self.require_market(market_id).await?;
        if !market.category.is_two_outcome() {
            return Err(EngineError::Validation(
                "market settles by score, not by winner".into(),
            ));
        }
        if market.is_settled() {
            return Err(EngineError::AlreadySettled);
        }
        let winner = self.require_runner(winning_runner_id).await?;
        if winner.market_id != market.id {
            return Err(EngineError::Validation(
                "runner does not belong to the market".into(),
            ));
        }

        let bets = self.store().market_running_bets(market.id).await?;
        self.settle_running_bets(
            &market,
            bets,
            |bet| bet.runner_id == winning_runner_id,
            LedgerWrite::SetMarketWinner {
                market_id: market.id,
                winner_runner_id: Some(winning_runner_id),
            },
        )
        .await?;

        tracing::info!(market = %market.id, winner = %winning_runner_id, "winner declared");
        Ok(())
    }

    async fn try_declare_score(
        &self,
        market_id: Uuid,
        runner_id: Uuid,
        win_score: Decimal,
    ) -> Result<(), EngineError> {
        let _market_guard = self.locks().write_market(market_id).await;

        let market = self.require_market(market_id).await?;
        if !market.category.is_fancy() {
            return Err(EngineError::Validation(
                "market settles by winner, not by score".into(),
            ));
        }
        let runner = self.require_runner(runner_id).await?;
        if runner.market_id != market.id {
            return Err(EngineError::Validation(
                "runner does not belong to the market".into(),
            ));
        }
        if runner.is_settled() {
            return Err(EngineError::AlreadySettled);
        }

        let bets: Vec<Bet> = self
            .store()
            .market_running_bets(market.id)
            .await?
            .into_iter()
            .filter(|bet| bet.runner_id == runner_id)
            .collect();

        self.settle_running_bets(
            &market,
            bets,
            |bet| {
                if bet.side.is_back() {
                    bet.odds <= win_score
                } else {
                    bet.odds > win_score
                }
            },
            LedgerWrite::SetRunnerWinScore {
                runner_id,
                win_score: Some(win_score),
            },
        )
        .await?;

        tracing::info!(market = %market.id, runner = %runner_id, score = %win_score,
            "score declared");
        Ok(())
    }

    /// Realize `bets`, release exposure, cascade P/L and commit everything
    /// (including `result_write`) as one batch. Caller holds the market's
    /// write guard.
    async fn settle_running_bets<F>(
        &self,
        market: &Market,
        bets: Vec<Bet>,
        bet_won: F,
        result_write: LedgerWrite,
    ) -> Result<(), EngineError>
    where
        F: Fn(&Bet) -> bool,
    {
        let runner_ids: Vec<Uuid> = self
            .store()
            .market_runners(market.id)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();

        // Deterministic per-user grouping keeps retries and notifications
        // stable.
        let mut by_user: BTreeMap<Uuid, Vec<Bet>> = BTreeMap::new();
        for bet in bets {
            by_user.entry(bet.user_id).or_default().push(bet);
        }

        // Pre-resolve every touched account and its ancestor chain before
        // taking any lock; the hierarchy itself is immutable to the engine.
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

        // Fresh financial state now that the locks are held.
        let mut users: HashMap<Uuid, User> = HashMap::new();
        for (user_id, _) in &to_lock {
            users.insert(*user_id, self.require_user(*user_id).await?);
        }

        let mut batch = LedgerBatch::new();
        let mut settled_users: Vec<User> = Vec::new();
        let mut ancestor_pl: BTreeMap<Uuid, Decimal> = BTreeMap::new();

        for (user_id, user_bets) in &by_user {
            let released = exposure::market_required(market.category, user_bets, &runner_ids);

            let mut user_pl = Decimal::ZERO;
            for bet in user_bets {
                let mut settled = bet.clone();
                settled.settle(bet_won(bet));
                user_pl += settled.realized_pl;
                batch.push(LedgerWrite::UpdateBet(settled));
            }

            let user = &users[user_id];
            let mut updated = user.clone();
            updated.exposure = (updated.exposure - released).max(Decimal::ZERO);
            updated.balance += user_pl;
            updated.realized_pl += user_pl;
            batch.push(LedgerWrite::PutUser {
                user: updated.clone(),
                expected_version: user.version,
            });
            tracing::debug!(user = %user_id, pl = %user_pl, released = %released,
                "settling user book");
            settled_users.push(updated);

            for ancestor_id in &chains[user_id] {
                *ancestor_pl.entry(*ancestor_id).or_default() += user_pl;
            }
        }

        let mut updated_ancestors: Vec<User> = Vec::new();
        for (ancestor_id, pl) in &ancestor_pl {
            let ancestor = &users[ancestor_id];
            let mut updated = ancestor.clone();
            updated.balance += *pl;
            updated.realized_pl += *pl;
            batch.push(LedgerWrite::PutUser {
                user: updated.clone(),
                expected_version: ancestor.version,
            });
            updated_ancestors.push(updated);
        }

        batch.push(result_write);

        let event_completed = self
            .event_fully_settled(market.event_id, market.id)
            .await?;
        if event_completed {
            batch.push(LedgerWrite::SetEventCompleted {
                event_id: market.event_id,
                is_completed: true,
            });
        }

        self.store().commit(batch).await?;

        for user in &settled_users {
            self.notify_user(user);
            self.notify_event_bets(user, market.event_id).await;
        }
        for ancestor in &updated_ancestors {
            self.notify_user(ancestor);
        }
        if event_completed {
            self.notify_event_completed(market.event_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::models::{BetSide, ResultStatus};
    use crate::services::placement::PlaceBetRequest;
    use crate::services::testutil::fixture;
    use crate::store::LedgerStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn winner_realizes_wins_and_releases_exposure() {
        let f = fixture().await;
        let bet = f
            .engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.market,
                runner_id: f.runner_a,
                side: BetSide::Back,
                odds: dec!(2.0),
                stake: dec!(100),
            })
            .await
            .unwrap();

        f.engine.declare_winner(f.market, f.runner_a).await.unwrap();

        let settled = f.store.bet(bet.id).await.unwrap();
        assert_eq!(settled.result_status, ResultStatus::Won);
        assert_eq!(settled.realized_pl, dec!(100.0));

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.balance, dec!(1100.0));
        assert_eq!(punter.exposure, Decimal::ZERO);
        assert_eq!(punter.realized_pl, dec!(100.0));

        let market = f.store.market(f.market).await.unwrap().unwrap();
        assert_eq!(market.winner_runner_id, Some(f.runner_a));
    }

    #[tokio::test]
    async fn loss_cascades_to_every_ancestor_but_the_owner() {
        let f = fixture().await;
        f.engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.market,
                runner_id: f.runner_a,
                side: BetSide::Back,
                odds: dec!(2.0),
                stake: dec!(100),
            })
            .await
            .unwrap();

        // runner B wins, the punter loses the stake
        f.engine.declare_winner(f.market, f.runner_b).await.unwrap();

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.balance, dec!(900));
        assert_eq!(punter.realized_pl, dec!(-100));

        for ancestor in [f.agent, f.master, f.admin] {
            let user = f.store.user(ancestor).await.unwrap().unwrap();
            assert_eq!(user.realized_pl, dec!(-100), "ancestor {ancestor}");
        }
        let agent = f.store.user(f.agent).await.unwrap().unwrap();
        assert_eq!(agent.balance, dec!(4900));

        // the root owner never participates in the cascade
        let owner = f.store.user(f.owner).await.unwrap().unwrap();
        assert_eq!(owner.balance, dec!(100000));
        assert_eq!(owner.realized_pl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn second_declaration_is_rejected_and_harmless() {
        let f = fixture().await;
        f.engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.market,
                runner_id: f.runner_a,
                side: BetSide::Back,
                odds: dec!(2.0),
                stake: dec!(100),
            })
            .await
            .unwrap();
        f.engine.declare_winner(f.market, f.runner_a).await.unwrap();
        let after_first = f.store.user(f.punter).await.unwrap().unwrap();

        let err = f.engine.declare_winner(f.market, f.runner_b).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadySettled));

        let after_second = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn winner_declaration_on_fancy_market_is_rejected() {
        let f = fixture().await;
        let err = f
            .engine
            .declare_winner(f.fancy_market, f.fancy_runner)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn score_at_or_over_the_line_wins_the_back() {
        let f = fixture().await;
        f.engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.fancy_market,
                runner_id: f.fancy_runner,
                side: BetSide::Back,
                odds: dec!(50),
                stake: dec!(100),
            })
            .await
            .unwrap();

        f.engine
            .declare_score(f.fancy_market, f.fancy_runner, dec!(60))
            .await
            .unwrap();

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.balance, dec!(1050));
        assert_eq!(punter.exposure, Decimal::ZERO);
        assert_eq!(punter.realized_pl, dec!(50));

        let runner = f.store.runner(f.fancy_runner).await.unwrap().unwrap();
        assert_eq!(runner.win_score, Some(dec!(60)));
    }

    #[tokio::test]
    async fn score_under_the_line_wins_the_lay() {
        let f = fixture().await;
        f.engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.fancy_market,
                runner_id: f.fancy_runner,
                side: BetSide::Lay,
                odds: dec!(51),
                stake: dec!(100),
            })
            .await
            .unwrap();

        f.engine
            .declare_score(f.fancy_market, f.fancy_runner, dec!(45))
            .await
            .unwrap();

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        // lay wins the stake
        assert_eq!(punter.balance, dec!(1100));
        assert_eq!(punter.realized_pl, dec!(100));
    }

    #[tokio::test]
    async fn settling_every_market_completes_the_event() {
        let f = fixture().await;
        let mut completed_rx = f.sink.subscribe_event_completed();

        f.engine.declare_winner(f.market, f.runner_a).await.unwrap();
        let event = f.store.event(f.event).await.unwrap().unwrap();
        assert!(!event.is_completed);

        f.engine
            .declare_score(f.fancy_market, f.fancy_runner, dec!(40))
            .await
            .unwrap();
        let event = f.store.event(f.event).await.unwrap().unwrap();
        assert!(event.is_completed);
        assert_eq!(completed_rx.recv().await.unwrap(), f.event);
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let f = fixture().await;
        let err = f
            .engine
            .declare_winner(uuid::Uuid::new_v4(), f.runner_a)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound("market", _)));
    }
}
