//! Per-key serialization of sync runs.
//!
//! At most one future runs per key at a time; futures with different keys
//! run concurrently. Waiters on one key are admitted in FIFO order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone, Default)]
pub struct KeyedQueue {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` once no other future holds `key`.
    pub async fn run<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.lock_for(key);
        let output = {
            let _guard = lock.lock().await;
            fut.await
        };
        self.release(key, lock);
        output
    }

    /// Number of keys with a running or waiting future.
    #[cfg(test)]
    pub fn active_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop the entry for `key` when nobody else is waiting on it.
    fn release(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map and ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}
