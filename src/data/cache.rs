use dashmap::DashMap;
use std::borrow::Borrow;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Concurrency-safe key/value store where every entry lives for a fixed TTL.
///
/// Expired entries are treated as absent and purged lazily on the next read.
/// Values are cloned out; the map itself never escapes.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    /// A zero TTL falls back to `DEFAULT_TTL`.
    pub fn new(ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { Self::DEFAULT_TTL } else { ttl };
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get value if not expired (evict on read)
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // Re-check under the write lock: a concurrent `set` may have refreshed it.
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    pub fn set(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Returns the cached value, or runs `supplier` and caches what it produces.
    ///
    /// The supplier runs without any lock held. Concurrent misses on the same
    /// key are not coalesced: each caller may run its own supplier and the
    /// last successful `set` wins. A failing supplier leaves the key untouched.
    pub fn get_or_set<E, F>(&self, key: K, supplier: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = supplier()?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Async flavour of [`TtlCache::get_or_set`] with the same guarantees.
    pub async fn get_or_set_async<E, F, Fut>(&self, key: K, supplier: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = supplier().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Physically stored entries, including expired ones not read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
