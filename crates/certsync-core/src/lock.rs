//! Keyed mutual exclusion
//!
//! One async mutex per key, created on first use and never removed. Holders
//! of different keys never contend; holders of the same key are serialised in
//! FIFO order (tokio's mutex is fair).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of per-key locks
#[derive(Debug, Default, Clone)]
pub struct KeyedLock {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Guard returned by [`KeyedLock::lock`]; the key is released on drop
#[derive(Debug)]
pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        // Clone the handle out so the map shard is not held across the await.
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        KeyedGuard {
            _guard: mutex.lock_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    impl KeyedLock {
        fn try_lock(&self, key: &str) -> Option<KeyedGuard> {
            let mutex = self.locks.get(key)?.clone();
            mutex
                .try_lock_owned()
                .ok()
                .map(|guard| KeyedGuard { _guard: guard })
        }

        fn len(&self) -> usize {
            self.locks.len()
        }
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLock::new();
        let guard = locks.lock("ns/svc").await;
        assert!(locks.try_lock("ns/svc").is_none());

        drop(guard);
        assert!(locks.try_lock("ns/svc").is_some());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = KeyedLock::new();
        let _a = locks.lock("ns/a").await;
        let _b = locks.lock("ns/b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_locks_are_never_removed() {
        let locks = KeyedLock::new();
        drop(locks.lock("ns/a").await);
        drop(locks.lock("ns/a").await);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serialises_critical_sections() {
        let locks = KeyedLock::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock("ns/svc").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
