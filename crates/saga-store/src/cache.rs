use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A pluggable key-value cache.
///
/// The core only requires these three operations; eviction policy is
/// the implementation's concern. Implementations must be safe to share
/// across threads.
pub trait Cache<K, V>: Send + Sync {
    /// Returns the cached value for the key, if present.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores a value under the key, replacing any previous entry.
    fn put(&self, key: K, value: V);

    /// Removes the entry for the key, if present.
    fn invalidate(&self, key: &K);
}

/// Cache capacities, loaded from environment variables.
///
/// Reads:
/// - `SAGA_CACHE_CAPACITY` — saga record cache entries (default: 1024)
/// - `ASSOCIATION_CACHE_CAPACITY` — association lookup cache entries
///   (default: 1024)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub saga_capacity: usize,
    pub association_capacity: usize,
}

impl CacheConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            saga_capacity: std::env::var("SAGA_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.saga_capacity),
            association_capacity: std::env::var("ASSOCIATION_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.association_capacity),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            saga_capacity: 1024,
            association_capacity: 1024,
        }
    }
}

/// Size-bounded LRU cache.
///
/// `lru::LruCache` mutates on read (it reorders the recency list), so
/// the whole structure sits behind a `std::sync::Mutex`.
pub struct LruSagaCache<K: Hash + Eq, V> {
    entries: Mutex<lru::LruCache<K, V>>,
}

impl<K: Hash + Eq, V> LruSagaCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, lru::LruCache<K, V>> {
        // A poisoned lock only means a panic happened mid-operation;
        // the map itself is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K, V> Cache<K, V> for LruSagaCache<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.locked().get(key).cloned()
    }

    fn put(&self, key: K, value: V) {
        self.locked().put(key, value);
    }

    fn invalidate(&self, key: &K) {
        self.locked().pop(key);
    }
}
