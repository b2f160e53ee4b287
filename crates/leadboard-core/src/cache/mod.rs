//! In-memory response cache.
//!
//! This module provides the `CacheStore`, a process-wide map from endpoint
//! key to the last payload fetched for it, and the `Prefetcher` that warms
//! the store ahead of navigation.
//!
//! Entries are never evicted. Staleness is judged per read against the
//! caller's TTL, and stale data is still served while it is revalidated.

pub mod prefetch;
pub mod store;

pub use prefetch::Prefetcher;
pub use store::{cache_key, CacheEntry, CacheStore, SharedFetch};
