//! Byte-budgeted LRU cache for the kiln server.
//!
//! The cache stores opaque byte-string keys and values under a fixed
//! byte budget. Every entry is charged `key.len() + value.len()` bytes
//! against the budget; inserting past the budget evicts entries in
//! least-recently-used order until the new entry fits.
//!
//! [`LruCache`] is the single-threaded engine. [`ThreadSafeCache`]
//! wraps it behind a mutex and is the type the server shares across
//! worker threads.

pub mod lru;
pub mod sync;

pub use lru::LruCache;
pub use sync::ThreadSafeCache;
