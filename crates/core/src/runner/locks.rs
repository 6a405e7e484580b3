use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::types::DbId;

/// Per-environment mutual exclusion for filesystem work.
///
/// A create and a delete for the same id never overlap; different ids
/// proceed in parallel. Idle entries are pruned on the next acquire.
#[derive(Debug, Clone, Default)]
pub struct InstallLocks {
    inner: Arc<Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InstallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: DbId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of ids currently held or waited on.
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().filter(|m| Arc::strong_count(m) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_serialized() {
        let locks = InstallLocks::new();
        let guard = locks.acquire(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender acquires after release")
            .unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = InstallLocks::new();
        let _a = locks.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(200), locks.acquire(2)).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = InstallLocks::new();
        drop(locks.acquire(1).await);
        drop(locks.acquire(2).await);
        assert_eq!(locks.active(), 0);
    }
}
