//! In-memory ledger
//!
//! Reference [`LedgerStore`] used by the test suite and by local/dev
//! deployments. All state lives behind one `RwLock`, which makes batch
//! commits trivially atomic: version checks run against a staged copy and
//! the copy replaces live state only when every write validates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Bet, Market, MarketRunner, SportEvent, User};

use super::{LedgerBatch, LedgerStore, LedgerWrite, StoreError};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    users: HashMap<Uuid, User>,
    markets: HashMap<Uuid, Market>,
    runners: HashMap<Uuid, MarketRunner>,
    events: HashMap<Uuid, SportEvent>,
    bets: HashMap<Uuid, Bet>,
}

/// In-memory, fully transactional ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for bootstrap and tests. Account/market CRUD is owned
    // by the administration layer, not this engine.

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn insert_event(&self, event: SportEvent) {
        self.state.write().await.events.insert(event.id, event);
    }

    pub async fn insert_market(&self, market: Market) {
        self.state.write().await.markets.insert(market.id, market);
    }

    pub async fn insert_runner(&self, runner: MarketRunner) {
        self.state.write().await.runners.insert(runner.id, runner);
    }

    pub async fn bet(&self, id: Uuid) -> Option<Bet> {
        self.state.read().await.bets.get(&id).cloned()
    }

    fn apply(state: &mut LedgerState, write: LedgerWrite) -> Result<(), StoreError> {
        match write {
            LedgerWrite::InsertBet(bet) => {
                state.bets.insert(bet.id, bet);
            }
            LedgerWrite::UpdateBet(bet) => {
                if !state.bets.contains_key(&bet.id) {
                    return Err(StoreError::MissingRow {
                        entity: "bet",
                        id: bet.id,
                    });
                }
                state.bets.insert(bet.id, bet);
            }
            LedgerWrite::PutUser {
                mut user,
                expected_version,
            } => {
                let current = state.users.get(&user.id).ok_or(StoreError::MissingRow {
                    entity: "user",
                    id: user.id,
                })?;
                if current.version != expected_version {
                    return Err(StoreError::VersionConflict { user_id: user.id });
                }
                user.version = expected_version + 1;
                state.users.insert(user.id, user);
            }
            LedgerWrite::SetMarketWinner {
                market_id,
                winner_runner_id,
            } => {
                let market = state
                    .markets
                    .get_mut(&market_id)
                    .ok_or(StoreError::MissingRow {
                        entity: "market",
                        id: market_id,
                    })?;
                market.winner_runner_id = winner_runner_id;
            }
            LedgerWrite::SetRunnerWinScore {
                runner_id,
                win_score,
            } => {
                let runner = state
                    .runners
                    .get_mut(&runner_id)
                    .ok_or(StoreError::MissingRow {
                        entity: "runner",
                        id: runner_id,
                    })?;
                runner.win_score = win_score;
            }
            LedgerWrite::SetEventCompleted {
                event_id,
                is_completed,
            } => {
                let event = state
                    .events
                    .get_mut(&event_id)
                    .ok_or(StoreError::MissingRow {
                        entity: "event",
                        id: event_id,
                    })?;
                event.is_completed = is_completed;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn market(&self, id: Uuid) -> Result<Option<Market>, StoreError> {
        Ok(self.state.read().await.markets.get(&id).cloned())
    }

    async fn runner(&self, id: Uuid) -> Result<Option<MarketRunner>, StoreError> {
        Ok(self.state.read().await.runners.get(&id).cloned())
    }

    async fn event(&self, id: Uuid) -> Result<Option<SportEvent>, StoreError> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn market_runners(&self, market_id: Uuid) -> Result<Vec<MarketRunner>, StoreError> {
        let state = self.state.read().await;
        let mut runners: Vec<MarketRunner> = state
            .runners
            .values()
            .filter(|r| r.market_id == market_id)
            .cloned()
            .collect();
        runners.sort_by_key(|r| r.created_at);
        Ok(runners)
    }

    async fn event_markets(&self, event_id: Uuid) -> Result<Vec<Market>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .markets
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn running_bets(
        &self,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<Vec<Bet>, StoreError> {
        let state = self.state.read().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| b.user_id == user_id && b.market_id == market_id && b.is_running())
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    async fn market_running_bets(&self, market_id: Uuid) -> Result<Vec<Bet>, StoreError> {
        let state = self.state.read().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| b.market_id == market_id && b.is_running())
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    async fn market_settled_bets(&self, market_id: Uuid) -> Result<Vec<Bet>, StoreError> {
        let state = self.state.read().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| b.market_id == market_id && b.is_settled())
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    async fn event_running_bets(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<Bet>, StoreError> {
        let state = self.state.read().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| b.user_id == user_id && b.event_id == event_id && b.is_running())
            .cloned()
            .collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        // Stage the whole batch on a copy; only a fully valid batch replaces
        // live state.
        let mut staged = state.clone();
        for write in batch.writes {
            Self::apply(&mut staged, write)?;
        }
        *state = staged;
        Ok(())
    }
}
