use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async serialization.
///
/// Operations holding the guard for a key run one at a time; different keys
/// never contend. Used to serialize state transitions per payment request id
/// and token refreshes per (user, provider).
#[derive(Default)]
pub struct KeyedLocks<K> {
    inner: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().expect("keyed lock map poisoned");
            // Guards and waiters each hold a clone; an entry only the map
            // still references is idle and can be dropped.
            map.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(map.entry(key).or_default())
        };
        mutex.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().expect("keyed lock map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(42u32).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire(1u32).await;
        // Must not deadlock.
        let _b = locks.acquire(2u32).await;
    }

    #[tokio::test]
    async fn test_idle_entries_are_evicted() {
        let locks = KeyedLocks::new();
        for key in 0..100u32 {
            let guard = locks.acquire(key).await;
            drop(guard);
        }
        // The next acquire sweeps everything no longer held.
        let _guard = locks.acquire(100u32).await;
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn test_held_entries_survive_eviction() {
        let locks = KeyedLocks::new();
        let held = locks.acquire(1u32).await;
        let _other = locks.acquire(2u32).await;
        assert_eq!(locks.tracked(), 2);
        drop(held);
        let _third = locks.acquire(3u32).await;
        assert_eq!(locks.tracked(), 2);
    }
}
