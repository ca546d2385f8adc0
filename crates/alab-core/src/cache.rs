//! Injectable TTL cache.
//!
//! Bounded by an LRU eviction policy and a per-entry time-to-live. One cache
//! is built at startup and passed by reference (usually behind an `Arc`) to
//! whatever performs registry lookups or package listings.

use std::fmt::Display;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// LRU cache whose entries expire after a fixed time-to-live.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Value for `key` regardless of age.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.entries.lock().peek(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().put(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the fresh value, or compute and store a new one.
    ///
    /// If computing fails and an expired value is still held, the expired
    /// value is returned and the failure is logged.
    pub fn get_or_refresh<E, F>(&self, key: K, fetch: F) -> Result<V, E>
    where
        K: Clone + Display,
        E: Display,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        match fetch() {
            Ok(value) => {
                self.insert(key, value.clone());
                Ok(value)
            }
            Err(err) => match self.get_stale(&key) {
                Some(stale) => {
                    tracing::warn!("Refresh of {} failed ({}), serving cached copy", key, err);
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(4, Duration::from_millis(20));
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get_stale(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_lru_eviction() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.get(&1);
        cache.insert(3, 3);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_or_refresh_serves_stale_on_error() {
        let cache: TtlCache<String, u32> = TtlCache::new(1, Duration::ZERO);
        let key = "registry".to_string();
        let first: Result<u32, String> = cache.get_or_refresh(key.clone(), || Ok(7));
        assert_eq!(first, Ok(7));

        let second: Result<u32, String> =
            cache.get_or_refresh(key.clone(), || Err("offline".to_string()));
        assert_eq!(second, Ok(7));

        cache.clear();
        let third: Result<u32, String> = cache.get_or_refresh(key, || Err("offline".to_string()));
        assert_eq!(third, Err("offline".to_string()));
    }
}
