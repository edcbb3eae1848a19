//! Post-commit notifications
//!
//! The engine publishes user and per-event snapshots after every committed
//! financial operation. Publishing is strictly post-commit and fire-and-
//! forget: a sink failure is logged and never surfaced to the caller, and
//! can never roll back or stall a commit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::Bet;

/// Point-in-time view of a user's finances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub exposure: Decimal,
    /// `balance - exposure`.
    pub available: Decimal,
    pub exposure_limit: Decimal,
    pub realized_pl: Decimal,
}

/// A user's open wagers and exposure within one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBetSnapshot {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub open_bets: Vec<Bet>,
    pub exposure: Decimal,
}

/// Outbound notification seam. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn publish_user_snapshot(&self, snapshot: UserSnapshot);
    fn publish_event_bets(&self, snapshot: EventBetSnapshot);
    fn publish_event_completed(&self, event_id: Uuid);
}

/// Broadcast-channel sink for real-time push layers (WebSocket fan-out
/// subscribes to these channels).
pub struct BroadcastSink {
    user_tx: broadcast::Sender<UserSnapshot>,
    event_bets_tx: broadcast::Sender<EventBetSnapshot>,
    event_completed_tx: broadcast::Sender<Uuid>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (user_tx, _) = broadcast::channel(capacity);
        let (event_bets_tx, _) = broadcast::channel(capacity);
        let (event_completed_tx, _) = broadcast::channel(capacity);
        Self {
            user_tx,
            event_bets_tx,
            event_completed_tx,
        }
    }

    /// Channel capacity from [`EngineConfig::notify_capacity`].
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.notify_capacity)
    }

    pub fn subscribe_users(&self) -> broadcast::Receiver<UserSnapshot> {
        self.user_tx.subscribe()
    }

    pub fn subscribe_event_bets(&self) -> broadcast::Receiver<EventBetSnapshot> {
        self.event_bets_tx.subscribe()
    }

    pub fn subscribe_event_completed(&self) -> broadcast::Receiver<Uuid> {
        self.event_completed_tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for BroadcastSink {
    fn publish_user_snapshot(&self, snapshot: UserSnapshot) {
        if self.user_tx.send(snapshot).is_err() {
            tracing::debug!("no subscribers for user snapshots");
        }
    }

    fn publish_event_bets(&self, snapshot: EventBetSnapshot) {
        if self.event_bets_tx.send(snapshot).is_err() {
            tracing::debug!("no subscribers for event bet snapshots");
        }
    }

    fn publish_event_completed(&self, event_id: Uuid) {
        if self.event_completed_tx.send(event_id).is_err() {
            tracing::debug!("no subscribers for event completion");
        }
    }
}
