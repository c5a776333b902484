//! Per-session turn serialization

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per session id.
///
/// A turn holds its session's lock from the prompt upsert until the reply is
/// persisted, so two turns on the same session never interleave their store
/// writes. Different sessions never contend.
#[derive(Debug, Default)]
pub struct TurnLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits for. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        // The map's own reference is the only one left when nobody holds or
        // awaits the lock; new acquirers clone under this same map lock
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_waits() {
        let locks = Arc::new(TurnLocks::new());
        let guard = locks.acquire("s").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("s").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_contend() {
        let locks = TurnLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_idle_keeps_held_locks() {
        let locks = TurnLocks::new();
        let held = locks.acquire("held").await;
        drop(locks.acquire("idle").await);

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }
}
