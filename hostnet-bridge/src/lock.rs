//! Per-bridge mutual exclusion around reconciliation.
//!
//! [`BridgeReconciler`] checks for a port group and creates it in two
//! separate host calls. [`SerializedReconciler`] keeps at most one
//! reconciliation per bridge name in flight so overlapping callers observe
//! each other's creation instead of racing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::reconciler::BridgeReconciler;
use crate::session::Session;
use crate::types::{DesiredState, ReconcileOutcome};

/// Registry of one async lock per bridge name.
#[derive(Default)]
pub struct BridgeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BridgeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `bridge`.
    ///
    /// Locks for different names never contend. The guard releases on drop.
    pub async fn acquire(&self, bridge: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|name, lock| name == bridge || Arc::strong_count(lock) > 1);
            locks
                .entry(bridge.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of bridge names currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A [`BridgeReconciler`] that serializes calls for the same bridge name.
#[derive(Clone)]
pub struct SerializedReconciler {
    inner: BridgeReconciler,
    locks: Arc<BridgeLocks>,
}

impl SerializedReconciler {
    pub fn new(inner: BridgeReconciler) -> Self {
        Self {
            inner,
            locks: Arc::new(BridgeLocks::new()),
        }
    }

    /// Share a lock registry with other reconcilers.
    pub fn with_locks(inner: BridgeReconciler, locks: Arc<BridgeLocks>) -> Self {
        Self { inner, locks }
    }

    /// Reconcile while holding the lock for `desired.bridge`.
    #[instrument(skip(self, session, desired), fields(bridge = %desired.bridge))]
    pub async fn reconcile(&self, session: &Session, desired: &DesiredState) -> Result<ReconcileOutcome> {
        let _guard = self.locks.acquire(&desired.bridge).await;
        debug!("Bridge lock acquired");
        self.inner.reconcile(session, desired).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_waits() {
        let locks = Arc::new(BridgeLocks::new());
        let guard = locks.acquire("pg-1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("pg-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_names_do_not_contend() {
        let locks = BridgeLocks::new();
        let _a = locks.acquire("pg-1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("pg-2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = BridgeLocks::new();
        drop(locks.acquire("pg-1").await);
        drop(locks.acquire("pg-2").await);
        drop(locks.acquire("pg-3").await);
        assert_eq!(locks.tracked(), 1);
    }
}
