//! Bet placement
//!
//! Validates a wager against a live odds snapshot, derives the incremental
//! exposure delta by running the calculator before and after the candidate
//! wager, and commits the new wager together with the user's updated
//! exposure as one atomic ledger batch. Notifications go out only after
//! the commit stands.

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Bet, BetSide, Market, MarketRunner, OrderStatus, ResultStatus, SportEvent};
use crate::store::{LedgerBatch, LedgerWrite};

use super::exposure::{self, Payout};
use super::ExchangeEngine;

/// A placement request as it arrives from the transport layer.
///
/// There is no implicit dedup key: a resubmitted request is a fresh wager,
/// and duplicate suppression belongs to the caller.
#[derive(Debug, Clone)]
pub struct PlaceBetRequest {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub runner_id: Uuid,
    pub side: BetSide,
    pub odds: Decimal,
    pub stake: Decimal,
}

/// Stake bounds after narrowing market, event and runner levels.
struct StakeBounds {
    min: Decimal,
    max: Decimal,
}

impl StakeBounds {
    /// The narrower of the market-level and event-level bounds.
    fn narrow(market: &Market, event: &SportEvent) -> Self {
        let mut min = market.min_stake;
        let mut max = market.max_stake;
        if let Some(event_min) = event.min_stake {
            min = min.max(event_min);
        }
        if let Some(event_max) = event.max_stake {
            max = max.min(event_max);
        }
        Self { min, max }
    }

    /// Runner-level bounds (fancy lines carry their own) override both.
    fn override_with(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        if let Some(min) = min {
            self.min = min;
        }
        if let Some(max) = max {
            self.max = max;
        }
        self
    }

    fn check(&self, stake: Decimal) -> Result<(), EngineError> {
        if stake < self.min {
            return Err(EngineError::Validation(format!(
                "stake {} is below the minimum {}",
                stake, self.min
            )));
        }
        if stake > self.max {
            return Err(EngineError::Validation(format!(
                "stake {} is above the maximum {}",
                stake, self.max
            )));
        }
        Ok(())
    }
}

impl ExchangeEngine {
    /// Place a wager. Rejections leave ledger state untouched.
    pub async fn place_bet(&self, req: PlaceBetRequest) -> Result<Bet, EngineError> {
        let mut attempt = 0;
        loop {
            match self.try_place_bet(&req).await {
                Err(EngineError::ConcurrencyConflict)
                    if attempt < self.config().commit_retries =>
                {
                    attempt += 1;
                    tracing::warn!(user = %req.user_id, attempt, "placement conflict, retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_place_bet(&self, req: &PlaceBetRequest) -> Result<Bet, EngineError> {
        if req.stake <= Decimal::ZERO {
            return Err(EngineError::Validation("stake must be positive".into()));
        }
        if req.odds <= Decimal::ZERO {
            return Err(EngineError::Validation("odds must be positive".into()));
        }

        // Shared market guard: settlement's exclusive guard keeps placements
        // out while a result lands.
        let _market_guard = self.locks().read_market(req.market_id).await;

        let market = self.require_market(req.market_id).await?;
        let event = self.require_event(market.event_id).await?;
        let runner = self.require_runner(req.runner_id).await?;
        if runner.market_id != market.id {
            return Err(EngineError::Validation(
                "runner does not belong to the market".into(),
            ));
        }
        if market.is_settled() || runner.is_settled() || !runner.is_active() {
            return Err(EngineError::MarketClosed);
        }

        let _user_guard = self.locks().lock_user(req.user_id).await;
        let user = self.require_user(req.user_id).await?;
        if !user.role.is_punter() {
            return Err(EngineError::Validation(
                "only end-user accounts can place bets".into(),
            ));
        }
        if !user.is_active {
            return Err(EngineError::Validation("account is suspended".into()));
        }
        if user.is_bet_locked {
            return Err(EngineError::Validation(
                "betting is locked for this account".into(),
            ));
        }

        // One feed snapshot, fetched immediately before the payout math and
        // used for both the freshness check and the payout itself.
        let (payout, bounds) = self.check_odds(&market, &event, &runner, req).await?;
        bounds.check(req.stake)?;

        let existing = self.store().running_bets(user.id, market.id).await?;
        let runner_ids: Vec<Uuid> = self
            .store()
            .market_runners(market.id)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();

        let candidate = Bet {
            id: Uuid::new_v4(),
            user_id: user.id,
            market_id: market.id,
            event_id: event.id,
            runner_id: runner.id,
            side: req.side,
            odds: req.odds,
            stake: req.stake,
            potential_win: payout.win,
            potential_loss: payout.loss,
            order_status: OrderStatus::Placed,
            result_status: ResultStatus::Running,
            realized_pl: Decimal::ZERO,
            created_at: Utc::now(),
        };

        let pre = exposure::market_required(market.category, &existing, &runner_ids);
        let mut with_candidate = existing;
        with_candidate.push(candidate.clone());
        let post = exposure::market_required(market.category, &with_candidate, &runner_ids);
        let delta = post - pre;
        let new_exposure = (user.exposure + delta).max(Decimal::ZERO);

        if delta > Decimal::ZERO {
            if user.balance < new_exposure {
                return Err(EngineError::InsufficientBalance);
            }
            if new_exposure > user.exposure_limit {
                return Err(EngineError::ExposureLimitExceeded);
            }
        }

        let mut updated = user.clone();
        updated.exposure = new_exposure;

        let mut batch = LedgerBatch::new();
        batch.push(LedgerWrite::InsertBet(candidate.clone()));
        batch.push(LedgerWrite::PutUser {
            user: updated.clone(),
            expected_version: user.version,
        });
        self.store().commit(batch).await?;

        tracing::info!(
            bet = %candidate.id,
            user = %user.id,
            market = %market.id,
            side = %candidate.side,
            odds = %candidate.odds,
            stake = %candidate.stake,
            exposure = %new_exposure,
            "bet placed"
        );

        self.notify_user(&updated);
        self.notify_event_bets(&updated, event.id).await;

        Ok(candidate)
    }

    /// Validate the requested odds against a fresh feed snapshot and return
    /// the payout it implies, plus any runner-level stake bounds.
    async fn check_odds(
        &self,
        market: &Market,
        event: &SportEvent,
        runner: &MarketRunner,
        req: &PlaceBetRequest,
    ) -> Result<(Payout, StakeBounds), EngineError> {
        let is_back = req.side.is_back();
        let bounds = StakeBounds::narrow(market, event);

        if market.category.is_two_outcome() {
            let ladders = timeout(
                self.config().feed_timeout(),
                self.feed().price_ladder(market.id),
            )
            .await
            .map_err(|_| EngineError::MarketDataUnavailable)??;

            let ladder = ladders
                .iter()
                .find(|l| l.selection_id == runner.selection_id)
                .ok_or(EngineError::StalePrice)?;
            if !ladder.quotes(is_back, req.odds) {
                return Err(EngineError::StalePrice);
            }
            let payout =
                exposure::potential_payout(market.category, req.side, req.odds, req.stake);
            Ok((payout, bounds))
        } else {
            let line = timeout(
                self.config().feed_timeout(),
                self.feed().fancy_line(market.id, runner.selection_id),
            )
            .await
            .map_err(|_| EngineError::MarketDataUnavailable)??;

            if !line.quotes(is_back, req.odds) {
                return Err(EngineError::StalePrice);
            }
            let payout =
                exposure::potential_payout(market.category, req.side, req.odds, req.stake);
            Ok((payout, bounds.override_with(line.min_stake, line.max_stake)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::feed::FancyLine;
    use crate::models::Role;
    use crate::services::testutil::{fixture, user, StaticFeed};
    use crate::store::LedgerStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn back(f: &crate::services::testutil::Fixture, odds: Decimal, stake: Decimal) -> PlaceBetRequest {
        PlaceBetRequest {
            user_id: f.punter,
            market_id: f.market,
            runner_id: f.runner_a,
            side: BetSide::Back,
            odds,
            stake,
        }
    }

    #[tokio::test]
    async fn first_back_bet_reserves_the_stake() {
        let f = fixture().await;
        let bet = f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap();
        assert_eq!(bet.potential_win, dec!(100.0));
        assert_eq!(bet.potential_loss, dec!(-100));

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.exposure, dec!(100));
        // balance is reserved against, not debited
        assert_eq!(punter.balance, dec!(1000));
    }

    #[tokio::test]
    async fn hedging_the_other_runner_releases_exposure() {
        let f = fixture().await;
        f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap();

        f.engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id: f.market,
                runner_id: f.runner_b,
                side: BetSide::Lay,
                odds: dec!(2.0),
                stake: dec!(100),
            })
            .await
            .unwrap();

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.exposure, Decimal::ZERO);
    }

    #[tokio::test]
    async fn odds_off_the_ladder_are_stale() {
        let f = fixture().await;
        let err = f.engine.place_bet(back(&f, dec!(2.5), dec!(100))).await.unwrap_err();
        assert!(matches!(err, EngineError::StalePrice));
        assert!(f.store.user(f.punter).await.unwrap().unwrap().exposure.is_zero());
    }

    #[tokio::test]
    async fn stake_bounds_are_enforced() {
        let f = fixture().await;
        let low = f.engine.place_bet(back(&f, dec!(2.0), dec!(5))).await.unwrap_err();
        assert!(matches!(low, EngineError::Validation(_)));

        let high = f.engine.place_bet(back(&f, dec!(2.0), dec!(501))).await.unwrap_err();
        assert!(matches!(high, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn event_bounds_narrow_market_bounds() {
        let f = fixture().await;
        // market allows 10..=500; the event tightens both ends
        let mut event = f.store.event(f.event).await.unwrap().unwrap();
        event.min_stake = Some(dec!(50));
        event.max_stake = Some(dec!(200));
        f.store.insert_event(event).await;

        let low = f.engine.place_bet(back(&f, dec!(2.0), dec!(20))).await.unwrap_err();
        assert!(matches!(low, EngineError::Validation(_)));

        let high = f.engine.place_bet(back(&f, dec!(2.0), dec!(300))).await.unwrap_err();
        assert!(matches!(high, EngineError::Validation(_)));

        f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap();
    }

    #[tokio::test]
    async fn fancy_line_bounds_override_market_bounds() {
        let f = fixture().await;
        // line carries its own bounds, wider on top and tighter below than
        // the market's 10..=500
        let mut feed = StaticFeed::default();
        feed.lines.insert(
            (f.fancy_market, 201),
            FancyLine {
                selection_id: 201,
                back_line: dec!(50),
                lay_line: dec!(51),
                min_stake: Some(dec!(25)),
                max_stake: Some(dec!(600)),
            },
        );
        let engine = ExchangeEngine::new(
            f.store.clone(),
            Arc::new(feed),
            f.sink.clone(),
            EngineConfig::default(),
        );
        let fancy = |stake| PlaceBetRequest {
            user_id: f.punter,
            market_id: f.fancy_market,
            runner_id: f.fancy_runner,
            side: BetSide::Back,
            odds: dec!(50),
            stake,
        };

        // the market alone would accept 20; the line minimum rejects it
        let low = engine.place_bet(fancy(dec!(20))).await.unwrap_err();
        assert!(matches!(low, EngineError::Validation(_)));

        // the market alone would reject 550; the line maximum accepts it
        engine.place_bet(fancy(dec!(550))).await.unwrap();
    }

    #[tokio::test]
    async fn balance_must_cover_total_exposure() {
        let f = fixture().await;
        f.store
            .insert_user(user(f.punter, Role::Punter, Some(f.agent), dec!(50)))
            .await;
        let err = f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance));
    }

    #[tokio::test]
    async fn exposure_limit_is_a_hard_ceiling() {
        let f = fixture().await;
        // plenty of balance, limit of 1000 from the fixture
        f.store
            .insert_user(user(f.punter, Role::Punter, Some(f.agent), dec!(10000)))
            .await;
        f.engine.place_bet(back(&f, dec!(2.0), dec!(500))).await.unwrap();
        f.engine.place_bet(back(&f, dec!(2.0), dec!(500))).await.unwrap();
        let err = f.engine.place_bet(back(&f, dec!(2.0), dec!(500))).await.unwrap_err();
        assert!(matches!(err, EngineError::ExposureLimitExceeded));
    }

    #[tokio::test]
    async fn locked_and_non_punter_accounts_are_rejected() {
        let f = fixture().await;
        let mut locked = user(f.punter, Role::Punter, Some(f.agent), dec!(1000));
        locked.is_bet_locked = true;
        f.store.insert_user(locked).await;
        let err = f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = f
            .engine
            .place_bet(PlaceBetRequest {
                user_id: f.agent,
                ..back(&f, dec!(2.0), dec!(100))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn settled_market_rejects_new_bets() {
        let f = fixture().await;
        let mut market = f.store.market(f.market).await.unwrap().unwrap();
        market.winner_runner_id = Some(f.runner_a);
        f.store.insert_market(market).await;

        let err = f.engine.place_bet(back(&f, dec!(2.0), dec!(100))).await.unwrap_err();
        assert!(matches!(err, EngineError::MarketClosed));
    }

    #[tokio::test]
    async fn missing_feed_data_is_recoverable() {
        let f = fixture().await;
        // a market the static feed knows nothing about
        let market_id = Uuid::new_v4();
        let runner_id = Uuid::new_v4();
        let m = f.store.market(f.market).await.unwrap().unwrap();
        f.store
            .insert_market(crate::models::Market {
                id: market_id,
                winner_runner_id: None,
                ..m
            })
            .await;
        let mut r = f.store.runner(f.runner_a).await.unwrap().unwrap();
        r.id = runner_id;
        r.market_id = market_id;
        f.store.insert_runner(r).await;

        let err = f
            .engine
            .place_bet(PlaceBetRequest {
                user_id: f.punter,
                market_id,
                runner_id,
                side: BetSide::Back,
                odds: dec!(2.0),
                stake: dec!(100),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MarketDataUnavailable));
    }

    #[tokio::test]
    async fn fancy_back_bet_uses_line_as_rate() {
        let f = fixture().await;
        let bet = f
            .engine
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
        assert_eq!(bet.potential_win, dec!(50));
        assert_eq!(bet.potential_loss, dec!(-100));

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        assert_eq!(punter.exposure, dec!(100));
    }

    #[tokio::test]
    async fn concurrent_placements_serialize_per_user() {
        let f = fixture().await;
        let (a, b) = tokio::join!(
            f.engine.place_bet(back(&f, dec!(2.0), dec!(100))),
            f.engine.place_bet(back(&f, dec!(2.0), dec!(150))),
        );
        a.unwrap();
        b.unwrap();

        let punter = f.store.user(f.punter).await.unwrap().unwrap();
        // both backs on the same runner: worst case is losing both stakes
        assert_eq!(punter.exposure, dec!(250));
    }

    #[tokio::test]
    async fn exposure_tracks_the_calculator_across_a_sequence() {
        let f = fixture().await;
        let requests = [
            (f.runner_a, BetSide::Back, dec!(2.0), dec!(100)),
            (f.runner_b, BetSide::Back, dec!(2.0), dec!(60)),
            (f.runner_a, BetSide::Lay, dec!(2.0), dec!(40)),
        ];
        for (runner_id, side, odds, stake) in requests {
            f.engine
                .place_bet(PlaceBetRequest {
                    user_id: f.punter,
                    market_id: f.market,
                    runner_id,
                    side,
                    odds,
                    stake,
                })
                .await
                .unwrap();

            let bets = f.store.running_bets(f.punter, f.market).await.unwrap();
            let expected = crate::services::exposure::market_required(
                crate::models::MarketCategory::MatchOdds,
                &bets,
                &[f.runner_a, f.runner_b],
            );
            let punter = f.store.user(f.punter).await.unwrap().unwrap();
            assert_eq!(punter.exposure, expected);
        }
    }
}
