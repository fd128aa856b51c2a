//! In-memory (single process) implementation of keyed serialization locks.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};
use tracing::trace;
use vcmd_locks::{LockManager, LockStatus};

#[derive(Debug)]
struct Waiter {
    id: u64,
    wake: oneshot::Sender<()>,
}

/// Table entry for a held key; exists exactly as long as the key has a holder.
#[derive(Debug, Default)]
struct Entry {
    queue: VecDeque<Waiter>,
}

#[derive(Debug, Default)]
struct Inner {
    next_waiter: AtomicU64,
    table: Mutex<HashMap<String, Entry>>,
}

/// In-memory keyed lock manager.
///
/// Keys are handed over in arrival order. The table only holds keys that
/// currently have a holder, so memory tracks active contention rather than
/// every key ever locked.
#[derive(Clone, Debug, Default)]
pub struct MemoryLockManager {
    inner: Arc<Inner>,
}

impl MemoryLockManager {
    /// Creates a new instance of `MemoryLockManager`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.inner.table.lock().len()
    }

    fn guard(&self, key: &str) -> MemoryLockGuard {
        MemoryLockGuard {
            key: key.to_string(),
            manager: self.clone(),
            released: false,
        }
    }
}

/// Exclusive access to one key. Dropping the guard releases the key.
#[derive(Debug)]
pub struct MemoryLockGuard {
    key: String,
    manager: MemoryLockManager,
    released: bool,
}

impl MemoryLockGuard {
    /// The key this guard holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the key now rather than at drop.
    pub fn release(mut self) {
        self.released = true;
        self.manager.release(&self.key);
    }
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release(&self.key);
        }
    }
}

/// A queued acquisition. Dropping it before the handover completes (timeout or
/// cancellation of the caller) withdraws it from the queue, or passes the key
/// on if the holder had already handed it over.
struct PendingAcquire<'a> {
    manager: &'a MemoryLockManager,
    key: &'a str,
    id: u64,
    wake: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }

        let mut table = self.manager.inner.table.lock();
        if let Some(entry) = table.get_mut(self.key) {
            if let Some(position) = entry.queue.iter().position(|w| w.id == self.id) {
                entry.queue.remove(position);
                return;
            }
        }
        drop(table);

        // Handover raced with giving up: we hold the key and must pass it on.
        if self.wake.try_recv().is_ok() {
            self.manager.release(self.key);
        }
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    type Error = Error;
    type Guard = MemoryLockGuard;

    fn check(&self, key: &str) -> LockStatus {
        self.inner
            .table
            .lock()
            .get(key)
            .map_or(LockStatus::Free, |entry| LockStatus::Held {
                queued: entry.queue.len(),
            })
    }

    async fn acquire(&self, key: &str, deadline: Instant) -> Result<Self::Guard, Self::Error> {
        let (id, wake) = {
            let mut table = self.inner.table.lock();

            let Some(entry) = table.get_mut(key) else {
                table.insert(key.to_string(), Entry::default());
                return Ok(self.guard(key));
            };

            let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            entry.queue.push_back(Waiter { id, wake: tx });
            trace!(key, queued = entry.queue.len(), "waiting for lock");

            (id, rx)
        };

        let mut pending = PendingAcquire {
            manager: self,
            key,
            id,
            wake,
            granted: false,
        };

        match timeout_at(deadline, &mut pending.wake).await {
            Ok(Ok(())) => {
                pending.granted = true;
                Ok(self.guard(key))
            }
            Ok(Err(_)) | Err(_) => Err(Error::Timeout),
        }
    }

    fn try_lock(&self, key: &str) -> Option<Self::Guard> {
        let mut table = self.inner.table.lock();

        if table.contains_key(key) {
            return None;
        }
        table.insert(key.to_string(), Entry::default());
        drop(table);

        Some(self.guard(key))
    }

    fn release(&self, key: &str) {
        let mut table = self.inner.table.lock();

        let Some(entry) = table.get_mut(key) else {
            panic!("released lock for {key} without holding it");
        };

        // Waiters that gave up already dropped their receiver; skip them.
        while let Some(waiter) = entry.queue.pop_front() {
            if waiter.wake.send(()).is_ok() {
                return;
            }
        }

        table.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use rand::Rng;

    fn soon(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn test_acquire_and_release_lock() {
        let manager = MemoryLockManager::new();
        let key = "test_key";

        let guard = manager.acquire(key, soon(100)).await.unwrap();
        assert_eq!(guard.key(), key);
        assert_eq!(manager.check(key), LockStatus::Held { queued: 0 });

        guard.release();
        assert_eq!(manager.check(key), LockStatus::Free);
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let manager = MemoryLockManager::new();

        {
            let _guard = manager.acquire("k", soon(100)).await.unwrap();
            assert_eq!(manager.active_keys(), 1);
        }

        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_trace() {
        let manager = MemoryLockManager::new();
        let _holder = manager.acquire("k", soon(100)).await.unwrap();

        let result = manager.acquire("k", soon(20)).await;
        assert_matches!(result, Err(Error::Timeout));
        assert_eq!(manager.check("k"), LockStatus::Held { queued: 0 });
    }

    #[tokio::test]
    async fn test_try_lock() {
        let manager = MemoryLockManager::new();

        let guard = manager.try_lock("k").unwrap();
        assert!(manager.try_lock("k").is_none());
        assert!(manager.try_lock("other").is_some());

        drop(guard);
        assert!(manager.try_lock("k").is_some());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let manager = MemoryLockManager::new();

        let _a = manager.acquire("a", soon(50)).await.unwrap();
        let b = manager.acquire("b", soon(50)).await;

        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_handover_is_fifo() {
        let manager = MemoryLockManager::new();
        let holder = manager.acquire("k", soon(1000)).await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..5 {
            let task_manager = manager.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let guard = task_manager.acquire("k", soon(5000)).await.unwrap();
                order.lock().push(n);
                drop(guard);
            }));
            // Let each waiter enqueue before the next one.
            while manager.check("k") != (LockStatus::Held { queued: n + 1 }) {
                tokio::task::yield_now().await;
            }
        }

        drop(holder);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let manager = MemoryLockManager::new();
        let holder = manager.acquire("k", soon(1000)).await.unwrap();

        let waiting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire("k", soon(5000)).await.map(|_| ()) })
        };
        while manager.check("k") != (LockStatus::Held { queued: 1 }) {
            tokio::task::yield_now().await;
        }
        waiting.abort();
        let _ = waiting.await;

        assert_eq!(manager.check("k"), LockStatus::Held { queued: 0 });
        drop(holder);
        assert_eq!(manager.check("k"), LockStatus::Free);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_holder_under_stress() {
        let manager = MemoryLockManager::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let acquired = Arc::new(AtomicUsize::new(0));
        let timed_out = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let manager = manager.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            let acquired = acquired.clone();
            let timed_out = timed_out.clone();

            handles.push(tokio::spawn(async move {
                let (hold_ms, wait_ms) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen_range(0..5), rng.gen_range(5..200))
                };

                match manager.acquire("vin", soon(wait_ms)).await {
                    Ok(guard) => {
                        let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now_inside, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        acquired.fetch_add(1, Ordering::SeqCst);
                        drop(guard);
                    }
                    Err(Error::Timeout) => {
                        timed_out.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(
            acquired.load(Ordering::SeqCst) + timed_out.load(Ordering::SeqCst),
            32
        );
        assert_eq!(manager.active_keys(), 0);
    }

    #[test]
    #[should_panic(expected = "without holding it")]
    fn test_release_without_holding_panics() {
        MemoryLockManager::new().release("never-locked");
    }
}
