// src/infra/cache.rs — Generic expiring cache

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default TTL for engine read caches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A plain expiring map: every entry carries its insertion instant and is
/// evicted lazily on read once the TTL has elapsed.
///
/// Used identically by the similarity registry's pair and list caches; not
/// thread-safe on its own (callers wrap it in a `Mutex`).
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V> ExpiringCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fetch a live entry, evicting it first if expired.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some((inserted, _)) => inserted.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    /// Drop every entry whose key matches the predicate.
    pub fn invalidate_where(&mut self, mut pred: impl FnMut(&K) -> bool) {
        self.entries.retain(|k, _| !pred(k));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
