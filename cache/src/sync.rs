//! Thread-safe wrapper around the LRU engine.
//!
//! The server's workload is dominated by tiny critical sections over a
//! shared index, so the engine sits behind a single coarse mutex. The
//! lock is held only for the duration of a cache call, never across
//! I/O.

use crate::lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;

/// A cloneable, thread-safe handle to an [`LruCache`].
///
/// Operations take effect in the order threads acquire the internal
/// mutex; each reader observes a consistent snapshot for the duration
/// of its call.
///
/// # Example
///
/// ```
/// use kiln_cache::ThreadSafeCache;
///
/// let cache = ThreadSafeCache::new(64);
/// assert!(cache.put(b"k", b"v"));
/// assert_eq!(cache.get(b"k"), Some(b"v".to_vec()));
/// ```
#[derive(Clone)]
pub struct ThreadSafeCache {
    inner: Arc<Mutex<LruCache>>,
}

impl ThreadSafeCache {
    /// Create a cache with the given byte budget.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(max_bytes))),
        }
    }

    /// Insert or update an entry. See [`LruCache::put`].
    pub fn put(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put(key, value)
    }

    /// Insert only if absent. See [`LruCache::put_if_absent`].
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put_if_absent(key, value)
    }

    /// Update an existing entry. See [`LruCache::set`].
    pub fn set(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().set(key, value)
    }

    /// Look up a value, copying it out while the lock is held.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().get(key).map(<[u8]>::to_vec)
    }

    /// Remove an entry. See [`LruCache::delete`].
    pub fn delete(&self, key: &[u8]) -> bool {
        self.inner.lock().delete(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Bytes currently charged against the budget.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes()
    }

    /// Configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.inner.lock().max_bytes()
    }
}
