//! Speculative cache warm-up.
//!
//! `Prefetcher::prefetch` is fire-and-forget: it returns a future the caller
//! may await or drop, and the fetch runs either way. Failures are logged and
//! otherwise ignored, since the view that later needs the data will fetch
//! it itself.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{self, AbortHandle, Abortable, FutureExt};
use tracing::debug;

use super::store::{cache_key, normalize, CacheStore, InFlight, SharedFetch};
use crate::api::{ApiClient, ApiError};
use crate::auth::CredentialSource;

#[derive(Clone)]
pub struct Prefetcher {
    store: CacheStore,
    client: ApiClient,
    credentials: Arc<dyn CredentialSource>,
}

impl Prefetcher {
    pub fn new(
        store: CacheStore,
        client: ApiClient,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            store,
            client,
            credentials,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Warm the cache entry for `endpoint`.
    ///
    /// While a prefetch for the same key is in flight, every call returns
    /// that same fetch. Without a credential nothing is fetched and the
    /// result is `Ok(None)`. The in-flight marker is recorded before this
    /// function returns, so back-to-back calls always join.
    ///
    /// Outside a tokio runtime the fetch is neither recorded nor started; it
    /// runs only if the returned future is awaited.
    pub fn prefetch(&self, endpoint: &str) -> SharedFetch {
        let key = cache_key(endpoint);

        if let Some(existing) = self.store.get(&key).and_then(|e| e.in_flight_fetch()) {
            debug!(key = %key, "Joining in-flight prefetch");
            return existing;
        }

        let Some(token) = self.credentials.token() else {
            debug!(key = %key, "No credential, skipping prefetch");
            return future::ready(Ok(None)).boxed().shared();
        };

        let id = self.store.next_fetch_id();
        let fetch = Self::fetch(self.store.clone(), self.client.clone(), key.clone(), token, id);

        // A marker is only recorded when a driver task can settle it
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!(key = %key, "No runtime, prefetch runs untracked when awaited");
                return fetch.boxed().shared();
            }
        };

        let (abort, registration) = AbortHandle::new_pair();
        let fetch = Abortable::new(fetch, registration)
            .map({
                let store = self.store.clone();
                let key = key.clone();
                move |result| match result {
                    Ok(result) => result,
                    Err(_aborted) => {
                        store.update(&key, |entry| (entry.unwrap_or_default().settle(id), ()));
                        debug!(key = %key, "Prefetch cancelled");
                        Err(ApiError::Cancelled)
                    }
                }
            })
            .boxed()
            .shared();

        let joined = self.store.update(&key, |entry| {
            let mut entry = entry.unwrap_or_default();
            if let Some(existing) = entry.in_flight_fetch() {
                return (entry, Some(existing));
            }
            entry.in_flight = Some(InFlight {
                id,
                fetch: fetch.clone(),
                abort,
            });
            (entry, None)
        });
        if let Some(existing) = joined {
            debug!(key = %key, "Joining in-flight prefetch");
            return existing;
        }

        runtime.spawn(fetch.clone().map(|_| ()));
        fetch
    }

    /// Abort an in-flight prefetch. Returns false when none was running.
    pub fn cancel(&self, endpoint: &str) -> bool {
        match self.store.get(&cache_key(endpoint)).and_then(|e| e.in_flight) {
            Some(in_flight) => {
                in_flight.abort.abort();
                true
            }
            None => false,
        }
    }

    async fn fetch(
        store: CacheStore,
        client: ApiClient,
        key: String,
        token: String,
        id: u64,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let result = client.get_json(&key, &token).await;
        let now = Utc::now();

        store.update(&key, |entry| {
            let mut entry = entry.unwrap_or_default();
            if let Ok(ref json) = result {
                entry = entry.with_data(json.clone(), now);
            }
            (entry.settle(id), ())
        });

        match result {
            Ok(json) => {
                debug!(key = %key, "Prefetch complete");
                Ok(normalize(json))
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Prefetch failed");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
