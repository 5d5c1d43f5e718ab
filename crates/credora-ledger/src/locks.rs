//! Per-wallet single-writer discipline
//!
//! Every mutation of a wallet runs while holding that wallet's lock. Locks
//! for several wallets are always taken in ascending user order so two
//! transfers in opposite directions cannot deadlock.

use std::sync::Arc;

use credora_types::UserId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-user async mutexes
#[derive(Clone, Default)]
pub struct WalletLocks {
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

/// Held wallet locks; released on drop
pub struct WalletGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single wallet
    pub async fn lock(&self, user_id: UserId) -> WalletGuard {
        let guard = self.handle(user_id).lock_owned().await;
        WalletGuard {
            _guards: vec![guard],
        }
    }

    /// Lock several wallets in ascending order; duplicates are locked once
    pub async fn lock_many(&self, user_ids: &[UserId]) -> WalletGuard {
        let mut ordered = user_ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for user_id in ordered {
            guards.push(self.handle(user_id).lock_owned().await);
        }
        WalletGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_excludes_second_writer() {
        let locks = WalletLocks::new();
        let user = UserId::new();

        let held = locks.lock(user).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_many_dedups() {
        let locks = WalletLocks::new();
        let user = UserId::new();
        // Would deadlock if the same mutex were taken twice.
        let _guard = locks.lock_many(&[user, user]).await;
    }

    #[tokio::test]
    async fn test_other_wallets_stay_free() {
        let locks = WalletLocks::new();
        let _a = locks.lock(UserId::new()).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock(UserId::new()))
            .await
            .unwrap();
    }
}
