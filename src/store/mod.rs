//! Ledger store interface
//!
//! The engine owns no durable storage. It reads users, markets, runners,
//! events and bets through this trait and writes exclusively through
//! [`LedgerStore::commit`], an all-or-nothing batch with per-user
//! expected-version checks ("update iff version unchanged"). A batch that
//! fails any check leaves the ledger byte-for-byte unchanged.

mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Bet, Market, MarketRunner, SportEvent, User};

/// Storage-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A compare-and-set write found a newer version of the user row.
    #[error("version conflict on user {user_id}")]
    VersionConflict { user_id: Uuid },

    /// A write referenced a row that does not exist.
    #[error("missing {entity} row: {id}")]
    MissingRow { entity: &'static str, id: Uuid },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One write in a ledger batch.
#[derive(Debug, Clone)]
pub enum LedgerWrite {
    InsertBet(Bet),
    /// Full-row update keyed by `bet.id`.
    UpdateBet(Bet),
    /// Replace the user row iff its stored version equals `expected_version`.
    /// The store bumps the version on apply.
    PutUser { user: User, expected_version: u64 },
    SetMarketWinner {
        market_id: Uuid,
        winner_runner_id: Option<Uuid>,
    },
    SetRunnerWinScore {
        runner_id: Uuid,
        win_score: Option<Decimal>,
    },
    SetEventCompleted {
        event_id: Uuid,
        is_completed: bool,
    },
}

/// An atomic unit of ledger writes.
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    pub writes: Vec<LedgerWrite>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Durable storage seam for the engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn market(&self, id: Uuid) -> Result<Option<Market>, StoreError>;
    async fn runner(&self, id: Uuid) -> Result<Option<MarketRunner>, StoreError>;
    async fn event(&self, id: Uuid) -> Result<Option<SportEvent>, StoreError>;

    /// All runners of a market, stable order.
    async fn market_runners(&self, market_id: Uuid) -> Result<Vec<MarketRunner>, StoreError>;

    /// All markets belonging to an event.
    async fn event_markets(&self, event_id: Uuid) -> Result<Vec<Market>, StoreError>;

    /// Running (placed, unsettled) bets of one user in one market.
    async fn running_bets(&self, user_id: Uuid, market_id: Uuid)
        -> Result<Vec<Bet>, StoreError>;

    /// Running bets of every user in a market.
    async fn market_running_bets(&self, market_id: Uuid) -> Result<Vec<Bet>, StoreError>;

    /// Settled (won/lost) bets in a market.
    async fn market_settled_bets(&self, market_id: Uuid) -> Result<Vec<Bet>, StoreError>;

    /// Running bets of one user across every market of an event.
    async fn event_running_bets(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<Bet>, StoreError>;

    /// Apply a batch atomically: every write lands, or none do.
    async fn commit(&self, batch: LedgerBatch) -> Result<(), StoreError>;
}
