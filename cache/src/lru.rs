//! The LRU engine: a slab of entries threaded onto an intrusive recency list.
//!
//! Entries live in a [`Slab`] and are addressed by stable `usize`
//! handles. The recency order is a doubly-linked list expressed as
//! `prev`/`next` handle fields inside each entry; the key index maps
//! key bytes to handles. Moving an entry to the tail is four handle
//! updates, deletion is two. The head of the list is the least
//! recently used entry and is always the first eviction victim.

use ahash::AHashMap;
use slab::Slab;

/// Handle value meaning "no entry".
const NIL: usize = usize::MAX;

/// A single cache entry.
///
/// The key is fixed at insertion; the value is replaced in place by
/// updates so its allocation can be reused.
struct Entry {
    key: Box<[u8]>,
    value: Vec<u8>,
    prev: usize,
    next: usize,
}

impl Entry {
    #[inline]
    fn cost(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A byte-budgeted LRU cache over byte-string keys and values.
///
/// Not thread safe; see [`ThreadSafeCache`](crate::ThreadSafeCache)
/// for the locked wrapper.
///
/// Every entry is charged `key.len() + value.len()` bytes. All
/// operations report policy rejections by returning `false` and leave
/// the cache unchanged in that case.
///
/// # Example
///
/// ```
/// use kiln_cache::LruCache;
///
/// let mut cache = LruCache::new(64);
/// assert!(cache.put(b"answer", b"42"));
/// assert_eq!(cache.get(b"answer"), Some(&b"42"[..]));
/// ```
pub struct LruCache {
    entries: Slab<Entry>,
    index: AHashMap<Box<[u8]>, usize>,
    /// Least recently used entry, first eviction victim.
    head: usize,
    /// Most recently used entry.
    tail: usize,
    max_bytes: usize,
    used_bytes: usize,
}

impl LruCache {
    /// Create a cache with the given byte budget.
    ///
    /// # Panics
    ///
    /// Panics if `max_bytes` is zero.
    pub fn new(max_bytes: usize) -> Self {
        assert!(max_bytes >= 1, "cache budget must be at least one byte");
        Self {
            entries: Slab::new(),
            index: AHashMap::new(),
            head: NIL,
            tail: NIL,
            max_bytes,
            used_bytes: 0,
        }
    }

    /// Byte cost an entry with this key and value would be charged.
    #[inline]
    pub fn cost_of(key: &[u8], value: &[u8]) -> usize {
        key.len() + value.len()
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently charged against the budget.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Configured byte budget.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns `true` if the key is present. Does not touch recency.
    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or update an entry.
    ///
    /// Behaves as [`set`](Self::set) when the key already exists.
    /// Otherwise evicts from the head until the new entry fits, then
    /// inserts it at the tail. Fails only when the entry alone exceeds
    /// the whole budget.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        let cost = Self::cost_of(key, value);
        if cost > self.max_bytes {
            return false;
        }

        if let Some(&handle) = self.index.get(key) {
            return self.replace_value(handle, value);
        }

        while self.max_bytes - self.used_bytes < cost {
            self.evict_head();
        }

        let handle = self.entries.insert(Entry {
            key: key.into(),
            value: value.to_vec(),
            prev: NIL,
            next: NIL,
        });
        self.attach_tail(handle);
        self.index.insert(key.into(), handle);
        self.used_bytes += cost;
        true
    }

    /// Insert only if the key is absent. Returns `false` on a present
    /// key or an oversized entry.
    pub fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        self.put(key, value)
    }

    /// Update an existing entry's value. Returns `false` if the key is
    /// absent or the grown entry cannot fit even after evicting every
    /// other entry; in both cases the cache is unchanged.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.index.get(key) {
            Some(&handle) => self.replace_value(handle, value),
            None => false,
        }
    }

    /// Look up a value, marking the entry most recently used.
    pub fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        let handle = *self.index.get(key)?;
        self.move_to_tail(handle);
        Some(&self.entries[handle].value)
    }

    /// Remove an entry. Returns `false` if the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let Some(handle) = self.index.remove(key) else {
            return false;
        };
        self.detach(handle);
        let entry = self.entries.remove(handle);
        self.used_bytes -= entry.cost();
        true
    }

    /// Drop every entry, keeping the configured budget.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
        self.used_bytes = 0;
    }

    /// Replace the value at `handle`, evicting from the head if the
    /// entry grows. The entry being updated is detached first so it
    /// can never become its own eviction victim.
    fn replace_value(&mut self, handle: usize, value: &[u8]) -> bool {
        let old_cost = self.entries[handle].cost();
        let new_cost = self.entries[handle].key.len() + value.len();

        if new_cost > old_cost {
            if new_cost > self.max_bytes {
                // Even an otherwise empty cache could not hold it.
                return false;
            }
            let growth = new_cost - old_cost;
            self.detach(handle);
            while self.max_bytes - self.used_bytes < growth {
                self.evict_head();
            }
            self.attach_tail(handle);
            self.used_bytes += growth;
        } else {
            self.used_bytes -= old_cost - new_cost;
            self.move_to_tail(handle);
        }

        let entry = &mut self.entries[handle];
        entry.value.clear();
        entry.value.extend_from_slice(value);
        true
    }

    /// Evict the head entry.
    ///
    /// Callers guarantee the list is non-empty: eviction loops only
    /// run when the shortfall is coverable, and `used_bytes` is zero
    /// once the list drains.
    fn evict_head(&mut self) {
        debug_assert_ne!(self.head, NIL);
        let victim = self.head;
        self.detach(victim);
        let entry = self.entries.remove(victim);
        self.index.remove(&entry.key);
        self.used_bytes -= entry.cost();
    }

    /// Unlink `handle` from the recency list.
    fn detach(&mut self, handle: usize) {
        let (prev, next) = {
            let entry = &self.entries[handle];
            (entry.prev, entry.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }
        let entry = &mut self.entries[handle];
        entry.prev = NIL;
        entry.next = NIL;
    }

    /// Link a detached `handle` at the tail (most recently used).
    fn attach_tail(&mut self, handle: usize) {
        let entry = &mut self.entries[handle];
        entry.prev = self.tail;
        entry.next = NIL;
        if self.tail == NIL {
            self.head = handle;
        } else {
            self.entries[self.tail].next = handle;
        }
        self.tail = handle;
    }

    #[inline]
    fn move_to_tail(&mut self, handle: usize) {
        if handle == self.tail {
            return;
        }
        self.detach(handle);
        self.attach_tail(handle);
    }

    /// Walk the recency list and cross-check it against the index and
    /// the byte accounting. Available in debug and test builds.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) {
        let mut seen = 0usize;
        let mut bytes = 0usize;
        let mut prev = NIL;
        let mut cursor = self.head;
        while cursor != NIL {
            let entry = &self.entries[cursor];
            assert_eq!(entry.prev, prev, "recency list prev link broken");
            assert_eq!(
                self.index.get(&entry.key).copied(),
                Some(cursor),
                "index does not agree with recency list"
            );
            bytes += entry.cost();
            seen += 1;
            prev = cursor;
            cursor = entry.next;
        }
        assert_eq!(prev, self.tail, "tail does not terminate the list");
        assert_eq!(seen, self.index.len(), "index and list diverge in size");
        assert_eq!(bytes, self.used_bytes, "byte accounting drifted");
        assert!(self.used_bytes <= self.max_bytes, "budget exceeded");
    }

    /// Keys from least to most recently used, for tests.
    #[cfg(any(test, debug_assertions))]
    pub fn keys_by_recency(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while cursor != NIL {
            let entry = &self.entries[cursor];
            keys.push(entry.key.to_vec());
            cursor = entry.next;
        }
        keys
    }
}
