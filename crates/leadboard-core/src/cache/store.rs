use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{AbortHandle, BoxFuture, Shared};
use serde_json::Value;

use crate::api::ApiError;

/// A fetch that several callers can await; resolves to the payload, or
/// `None` when there was nothing to fetch.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Option<Value>, ApiError>>>;

/// Cache key for an endpoint. The path is used verbatim.
pub fn cache_key(endpoint: &str) -> String {
    endpoint.to_string()
}

/// Marker for a prefetch that has not settled yet.
#[derive(Clone)]
pub(crate) struct InFlight {
    pub(crate) id: u64,
    pub(crate) fetch: SharedFetch,
    pub(crate) abort: AbortHandle,
}

#[derive(Clone, Default)]
pub struct CacheEntry {
    /// Last successfully fetched payload. A `null` body counts as no data.
    pub data: Option<Value>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub(crate) in_flight: Option<InFlight>,
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("data", &self.data)
            .field("fetched_at", &self.fetched_at)
            .field("in_flight", &self.in_flight.as_ref().map(|i| i.id))
            .finish()
    }
}

impl CacheEntry {
    /// A settled entry holding `data` fetched at `fetched_at`.
    pub fn settled(data: Value, fetched_at: DateTime<Utc>) -> Self {
        Self::default().with_data(data, fetched_at)
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn in_flight_fetch(&self) -> Option<SharedFetch> {
        self.in_flight.as_ref().map(|i| i.fetch.clone())
    }

    /// Entry with fresh data. Any in-flight marker is kept.
    pub(crate) fn with_data(mut self, data: Value, fetched_at: DateTime<Utc>) -> Self {
        self.data = normalize(data);
        self.fetched_at = Some(fetched_at);
        self
    }

    /// Entry with the in-flight marker `id` removed. A marker installed by a
    /// later prefetch is left alone.
    pub(crate) fn settle(mut self, id: u64) -> Self {
        if self.in_flight.as_ref().map(|i| i.id) == Some(id) {
            self.in_flight = None;
        }
        self
    }

    /// Whether the data is older than `ttl`. Data without a fetch time is
    /// always stale.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Some(fetched_at) = self.fetched_at else {
            return true;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - fetched_at > ttl,
            // TTL beyond chrono's range never expires
            Err(_) => false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.fetched_at.map(|t| now - t)
    }
}

/// `null` payloads are stored as "no data".
pub(crate) fn normalize(data: Value) -> Option<Value> {
    match data {
        Value::Null => None,
        data => Some(data),
    }
}

/// Shared map from endpoint key to `CacheEntry`.
///
/// Clone is cheap and every clone sees the same entries. The lock is never
/// held across an await, and every write replaces a whole entry.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    next_fetch_id: Arc<AtomicU64>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, entry: CacheEntry) {
        self.lock().insert(key.to_string(), entry);
    }

    /// Read-modify-write of one entry under a single lock acquisition.
    ///
    /// `f` receives the current entry (if any) and returns its replacement
    /// plus a value handed back to the caller. `f` must not touch the store.
    pub fn update<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<CacheEntry>) -> (CacheEntry, R),
    ) -> R {
        let mut entries = self.lock();
        let current = entries.remove(key);
        let (next, result) = f(current);
        entries.insert(key.to_string(), next);
        result
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn next_fetch_id(&self) -> u64 {
        self.next_fetch_id.fetch_add(1, Ordering::Relaxed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_set_roundtrip() {
        let store = CacheStore::new();
        assert!(store.get("api/projects").is_none());

        store.set("api/projects", CacheEntry::settled(json!({"projects": []}), Utc::now()));
        let entry = store.get("api/projects").unwrap();
        assert!(entry.has_data());
        assert!(!entry.is_in_flight());
        assert_eq!(store.keys(), vec!["api/projects".to_string()]);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = CacheStore::new();
        let other = store.clone();
        other.set("k", CacheEntry::settled(json!(1), Utc::now()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_null_payload_counts_as_no_data() {
        let entry = CacheEntry::settled(Value::Null, Utc::now());
        assert!(!entry.has_data());
        assert!(entry.fetched_at.is_some());
    }

    #[test]
    fn test_staleness_is_strict() {
        let now = Utc::now();
        let ttl = Duration::from_millis(30_000);

        let exactly = CacheEntry::settled(json!(1), now - chrono::Duration::milliseconds(30_000));
        assert!(!exactly.is_stale(ttl, now));

        let over = CacheEntry::settled(json!(1), now - chrono::Duration::milliseconds(30_001));
        assert!(over.is_stale(ttl, now));

        let fresh = CacheEntry::settled(json!(1), now);
        assert!(!fresh.is_stale(ttl, now));
    }

    #[test]
    fn test_data_without_timestamp_is_stale() {
        let entry = CacheEntry {
            data: Some(json!(1)),
            ..Default::default()
        };
        assert!(entry.is_stale(Duration::from_secs(3600), Utc::now()));
        assert!(entry.age(Utc::now()).is_none());
    }

    #[test]
    fn test_update_replaces_whole_entry() {
        let store = CacheStore::new();
        let seen = store.update("k", |current| {
            (CacheEntry::settled(json!("a"), Utc::now()), current.is_some())
        });
        assert!(!seen);

        let previous = store.update("k", |current| {
            let current = current.unwrap_or_default();
            let previous = current.data.clone();
            (current.with_data(json!("b"), Utc::now()), previous)
        });
        assert_eq!(previous, Some(json!("a")));
        assert_eq!(store.get("k").unwrap().data, Some(json!("b")));
    }

    #[test]
    fn test_fetch_ids_are_unique() {
        let store = CacheStore::new();
        let a = store.next_fetch_id();
        let b = store.clone().next_fetch_id();
        assert_ne!(a, b);
    }
}
