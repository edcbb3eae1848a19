//! Engine services
//!
//! [`ExchangeEngine`] is the facade the transport layer consumes. It owns
//! the collaborator handles, the lock registry and the retry policy; the
//! actual operations live in the sibling modules (placement, settlement,
//! reversal, queries) as further `impl ExchangeEngine` blocks.

pub mod exposure;
pub mod locks;
pub mod placement;
pub mod queries;
pub mod reversal;
pub mod settlement;

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feed::OddsFeed;
use crate::models::{Market, MarketRunner, Role, SportEvent, User};
use crate::notify::{EventBetSnapshot, NotificationSink, UserSnapshot};
use crate::store::LedgerStore;

use locks::LockRegistry;

/// The bet placement, exposure and settlement engine.
pub struct ExchangeEngine {
    store: Arc<dyn LedgerStore>,
    feed: Arc<dyn OddsFeed>,
    sink: Arc<dyn NotificationSink>,
    locks: LockRegistry,
    config: EngineConfig,
}

impl ExchangeEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        feed: Arc<dyn OddsFeed>,
        sink: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            feed,
            sink,
            locks: LockRegistry::new(),
            config,
        }
    }

    pub(crate) fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    pub(crate) fn feed(&self) -> &dyn OddsFeed {
        self.feed.as_ref()
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Required-entity reads
    // ========================================================================

    pub(crate) async fn require_user(&self, id: Uuid) -> Result<User, EngineError> {
        self.store
            .user(id)
            .await?
            .ok_or(EngineError::NotFound("user", id))
    }

    pub(crate) async fn require_market(&self, id: Uuid) -> Result<Market, EngineError> {
        self.store
            .market(id)
            .await?
            .ok_or(EngineError::NotFound("market", id))
    }

    pub(crate) async fn require_runner(&self, id: Uuid) -> Result<MarketRunner, EngineError> {
        self.store
            .runner(id)
            .await?
            .ok_or(EngineError::NotFound("runner", id))
    }

    pub(crate) async fn require_event(&self, id: Uuid) -> Result<SportEvent, EngineError> {
        self.store
            .event(id)
            .await?
            .ok_or(EngineError::NotFound("event", id))
    }

    // ========================================================================
    // Ancestor chain
    // ========================================================================

    /// Resolve the ancestor chain of `user`, child-to-parent, up to but
    /// excluding the root owner. The walk is bounded by the role count; a
    /// longer chain is a data fault, not something to recurse through.
    pub(crate) async fn resolve_ancestors(&self, user: &User) -> Result<Vec<User>, EngineError> {
        let mut chain = Vec::new();
        let mut next = user.parent_id;
        for _ in 0..Role::COUNT {
            let Some(parent_id) = next else {
                return Ok(chain);
            };
            let parent = self.require_user(parent_id).await?;
            if parent.role == Role::Owner {
                return Ok(chain);
            }
            next = parent.parent_id;
            chain.push(parent);
        }
        Err(EngineError::Storage(format!(
            "ancestor chain of user {} exceeds the role depth",
            user.id
        )))
    }

    // ========================================================================
    // Post-commit notifications
    // ========================================================================

    pub(crate) fn snapshot_of(user: &User) -> UserSnapshot {
        UserSnapshot {
            user_id: user.id,
            balance: user.balance,
            exposure: user.exposure,
            available: user.available(),
            exposure_limit: user.exposure_limit,
            realized_pl: user.realized_pl,
        }
    }

    pub(crate) fn notify_user(&self, user: &User) {
        self.sink.publish_user_snapshot(Self::snapshot_of(user));
    }

    /// Publish the user's open bets and exposure within one event. Reads
    /// run post-commit; a failed read only costs the notification.
    pub(crate) async fn notify_event_bets(&self, user: &User, event_id: Uuid) {
        let open_bets = match self.store.event_running_bets(user.id, event_id).await {
            Ok(bets) => bets,
            Err(err) => {
                tracing::warn!(user = %user.id, event = %event_id, %err,
                    "skipping event bet snapshot");
                return;
            }
        };
        let exposure = match self.event_exposure_of(user.id, event_id).await {
            Ok(exposure) => exposure,
            Err(err) => {
                tracing::warn!(user = %user.id, event = %event_id, %err,
                    "skipping event bet snapshot");
                return;
            }
        };
        self.sink.publish_event_bets(EventBetSnapshot {
            event_id,
            user_id: user.id,
            open_bets,
            exposure,
        });
    }

    pub(crate) fn notify_event_completed(&self, event_id: Uuid) {
        self.sink.publish_event_completed(event_id);
    }

    // ========================================================================
    // Event state
    // ========================================================================

    /// Whether every market of the event has a declared result, treating
    /// `just_settled` as settled regardless of its stored state.
    pub(crate) async fn event_fully_settled(
        &self,
        event_id: Uuid,
        just_settled: Uuid,
    ) -> Result<bool, EngineError> {
        for market in self.store.event_markets(event_id).await? {
            if market.id == just_settled {
                continue;
            }
            if market.category.is_two_outcome() {
                if market.winner_runner_id.is_none() {
                    return Ok(false);
                }
            } else {
                let runners = self.store.market_runners(market.id).await?;
                if runners.iter().any(|r| r.win_score.is_none()) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// A user's total capital-at-risk across every market of an event,
    /// computed from their running wagers with the per-category rules.
    pub(crate) async fn event_exposure_of(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Decimal, EngineError> {
        let mut total = Decimal::ZERO;
        for market in self.store.event_markets(event_id).await? {
            let bets = self.store.running_bets(user_id, market.id).await?;
            if bets.is_empty() {
                continue;
            }
            let runner_ids: Vec<Uuid> = self
                .store
                .market_runners(market.id)
                .await?
                .iter()
                .map(|r| r.id)
                .collect();
            total += exposure::market_required(market.category, &bets, &runner_ids);
        }
        Ok(total)
    }
}

// ============================================================================
// Test fixture
// ============================================================================
