//! Serialization boundaries
//!
//! Every state transition for a (user, market) pair runs under locks from
//! this registry. Placement takes the market read-guard and then the user's
//! mutex; settlement and reversal take the market write-guard (excluding
//! concurrent placements on that market) and then the mutexes of every
//! touched user in a fixed global order: hierarchy depth descending (child
//! before parent), ties broken by id. The fixed order rules out lock
//! cycles between concurrent settlements whose cascades share ancestors.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::models::Role;

/// Registry of per-user and per-market locks, created on first use.
#[derive(Debug, Default)]
pub struct LockRegistry {
    users: DashMap<Uuid, Arc<Mutex<()>>>,
    markets: DashMap<Uuid, Arc<RwLock<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.users
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn market_lock(&self, market_id: Uuid) -> Arc<RwLock<()>> {
        self.markets
            .entry(market_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Serialize against other operations touching this user.
    pub async fn lock_user(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        self.user_lock(user_id).lock_owned().await
    }

    /// Shared market guard; placements hold this while settlement is not
    /// running on the market.
    pub async fn read_market(&self, market_id: Uuid) -> OwnedRwLockReadGuard<()> {
        self.market_lock(market_id).read_owned().await
    }

    /// Exclusive market guard for settlement and reversal.
    pub async fn write_market(&self, market_id: Uuid) -> OwnedRwLockWriteGuard<()> {
        self.market_lock(market_id).write_owned().await
    }

    /// Lock a set of users in the fixed global order (deepest role first,
    /// then id). Callers pass every user a cascade will touch, end-users
    /// and ancestors alike, deduplicated.
    pub async fn lock_users_ordered(
        &self,
        users: &mut Vec<(Uuid, Role)>,
    ) -> Vec<OwnedMutexGuard<()>> {
        users.sort_by(|a, b| b.1.depth().cmp(&a.1.depth()).then(a.0.cmp(&b.0)));
        users.dedup_by_key(|entry| entry.0);

        let mut guards = Vec::with_capacity(users.len());
        for (user_id, _) in users.iter() {
            guards.push(self.lock_user(*user_id).await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_lock_serializes() {
        let registry = LockRegistry::new();
        let id = Uuid::new_v4();
        let guard = registry.lock_user(id).await;
        assert!(registry.user_lock(id).try_lock().is_err());
        drop(guard);
        assert!(registry.user_lock(id).try_lock().is_ok());
    }

    #[tokio::test]
    async fn market_write_excludes_readers() {
        let registry = LockRegistry::new();
        let id = Uuid::new_v4();
        let write = registry.write_market(id).await;
        assert!(registry.market_lock(id).try_read().is_err());
        drop(write);
        assert!(registry.market_lock(id).try_read().is_ok());
    }

    #[tokio::test]
    async fn ordered_locking_sorts_children_first_and_dedups() {
        let registry = LockRegistry::new();
        let punter = (Uuid::new_v4(), Role::Punter);
        let agent = (Uuid::new_v4(), Role::Agent);
        let mut users = vec![agent, punter, agent];
        let guards = registry.lock_users_ordered(&mut users).await;
        assert_eq!(guards.len(), 2);
        assert_eq!(users[0].0, punter.0);
        assert_eq!(users[1].0, agent.0);
    }
}
