//! User accounts and the reseller hierarchy
//!
//! Every account sits in a tree rooted at a single owner. Profit and loss
//! realized by a punter ripples strictly along the `parent_id` chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role, ordered from the root of the hierarchy downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    SuperMaster,
    Master,
    Agent,
    /// End-user; the only role that can place bets.
    Punter,
}

impl Role {
    /// Total number of hierarchy roles. Bounds every ancestor walk.
    pub const COUNT: usize = 6;

    /// Depth in the hierarchy: 0 for the owner, 5 for a punter.
    pub fn depth(&self) -> usize {
        match self {
            Role::Owner => 0,
            Role::Admin => 1,
            Role::SuperMaster => 2,
            Role::Master => 3,
            Role::Agent => 4,
            Role::Punter => 5,
        }
    }

    pub fn is_punter(&self) -> bool {
        matches!(self, Role::Punter)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::SuperMaster => "super_master",
            Role::Master => "master",
            Role::Agent => "agent",
            Role::Punter => "punter",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user account.
///
/// `exposure` is the capital currently reserved against the user's running
/// wagers; it never goes below zero. `version` backs the ledger store's
/// compare-and-set writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    /// Owning reseller; `None` only for the owner.
    pub parent_id: Option<Uuid>,
    pub balance: Decimal,
    pub exposure: Decimal,
    pub realized_pl: Decimal,
    /// Hard ceiling on `exposure`.
    pub exposure_limit: Decimal,
    pub is_active: bool,
    pub is_bet_locked: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Balance not currently reserved against open wagers.
    pub fn available(&self) -> Decimal {
        self.balance - self.exposure
    }

    /// Whether this account may place bets right now.
    pub fn can_bet(&self) -> bool {
        self.role.is_punter() && self.is_active && !self.is_bet_locked
    }
}
