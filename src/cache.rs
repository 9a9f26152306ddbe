//! In-process TTL cache for computed metrics.
//!
//! Entries are type-erased and cloned out on read. Expired entries are
//! dropped lazily the next time their key is looked up; there is no sweeper
//! and no size bound.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key/value store with a per-entry time-to-live.
///
/// Concurrent misses on the same key are not coalesced: each caller computes
/// and the last `set` wins.
#[derive(Default)]
pub struct Cache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set<T>(&self, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = Entry {
            value: Arc::new(value),
            expires_at: Instant::now() + ttl,
        };
        self.lock().insert(key.to_string(), entry);
    }

    /// Fetch a live value. Returns `None` when the key is missing, expired,
    /// or holds a value of a different type.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.value.downcast_ref::<T>().cloned(),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Whether a live entry exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries are inserted whole, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
