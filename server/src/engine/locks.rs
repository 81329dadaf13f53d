use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-server mutual exclusion for compound permission operations.
///
/// Always acquire the lock before taking a pooled connection. Entries only
/// live while someone holds or waits for them.
#[derive(Default)]
pub struct ServerLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one server, released on drop.
pub struct ServerGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    server_id: String,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
}

impl Drop for ServerGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone, so the map's Arc is the last one only when idle.
        self.locks
            .remove_if(&self.server_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl ServerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a server.
    pub async fn lock(&self, server_id: &str) -> ServerGuard<'_> {
        // Clone the Arc out so the DashMap shard guard is released before awaiting.
        let mutex = self
            .locks
            .entry(server_id.to_string())
            .or_default()
            .clone();
        // Built before waiting so a cancelled waiter still cleans up.
        let mut guard = ServerGuard {
            guard: None,
            server_id: server_id.to_string(),
            locks: &self.locks,
        };
        guard.guard = Some(mutex.lock_owned().await);
        guard
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_server_serialized() {
        let locks = Arc::new(ServerLocks::new());
        let guard = locks.lock("s1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("s1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_servers_independent() {
        let locks = ServerLocks::new();
        let _a = locks.lock("s1").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock("s2"))
            .await
            .expect("independent servers must not block each other");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let locks = ServerLocks::new();
        for i in 0..50 {
            let _g = locks.lock(&format!("s{i}")).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_contended() {
        let locks = Arc::new(ServerLocks::new());
        let guard = locks.lock("s1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("s1").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        // The waiter still holds the mutex, so the entry must survive.
        assert_eq!(locks.len(), 1);
        let blocked = tokio::time::timeout(Duration::from_millis(5), locks.lock("s1")).await;
        assert!(blocked.is_err());

        contender.await.unwrap();
        assert!(locks.is_empty());
    }
}
