//! Cached queries: what a view mounts to read an endpoint.
//!
//! Mounting serves whatever the `CacheStore` already holds for the endpoint
//! and then decides whether to fetch:
//!
//! - no cached data: foreground fetch, `loading` until it settles
//! - cached data older than the TTL: background fetch, `refreshing` while
//!   the cached data stays visible
//! - fresh cached data: no request
//!
//! Every successful fetch is written to the store, so views mounting the
//! same endpoint later start from it. Fetch errors land in
//! `QueryState::error` and never replace data that is already there.
//!
//! A `QueryHandle` owns its state. Fetch tasks only hold a weak reference,
//! so once the handle is dropped their results still reach the store but no
//! longer touch the (discarded) view state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::CredentialSource;
use crate::cache::{cache_key, CacheEntry, CacheStore};
use crate::config::{Config, DEFAULT_TTL_MS};
use crate::events::{DashboardEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How old cached data may be before a background revalidation starts.
    pub ttl: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::ttl_ms(DEFAULT_TTL_MS)
    }
}

impl QueryOptions {
    pub fn ttl_ms(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.default_ttl(),
        }
    }
}

/// What a mounted view renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub data: Option<Value>,
    pub error: Option<ApiError>,
    /// No data yet and a fetch is running.
    pub loading: bool,
    /// Data is shown while a background fetch revalidates it.
    pub refreshing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Empty,
    Loading,
    Ready,
    Refreshing,
    Errored,
}

impl QueryState {
    pub fn status(&self) -> QueryStatus {
        if self.loading {
            QueryStatus::Loading
        } else if self.refreshing {
            QueryStatus::Refreshing
        } else if self.data.is_some() {
            QueryStatus::Ready
        } else if self.error.is_some() {
            QueryStatus::Errored
        } else {
            QueryStatus::Empty
        }
    }

    /// Error with nothing else to show; the view should offer a retry.
    pub fn needs_retry(&self) -> bool {
        self.error.is_some() && self.data.is_none() && !self.loading
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        let data = self.data.clone()?;
        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Cached payload does not match requested type");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    Foreground,
    Background,
}

struct QueryContext {
    store: CacheStore,
    client: ApiClient,
    credentials: Arc<dyn CredentialSource>,
}

/// View state owned by a mounted handle.
struct Scope {
    state: watch::Sender<QueryState>,
    /// Id of the most recently started fetch. Only that fetch settles the
    /// `loading`/`refreshing` flags and the view's data.
    latest: AtomicU64,
}

/// Mounts cached queries against one store.
/// Clone is cheap; clones share the store, client and credentials.
#[derive(Clone)]
pub struct QueryClient {
    context: Arc<QueryContext>,
}

impl QueryClient {
    pub fn new(
        store: CacheStore,
        client: ApiClient,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            context: Arc::new(QueryContext {
                store,
                client,
                credentials,
            }),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.context.store
    }

    /// Bind to `endpoint`. The returned handle already holds the initial
    /// state, and any fetch it needs has been started.
    ///
    /// An absent or empty endpoint gives an idle handle that never fetches.
    /// Outside a tokio runtime nothing is started; `refetch().await` then
    /// runs the fetch.
    pub fn mount(&self, endpoint: Option<&str>, options: QueryOptions) -> QueryHandle {
        let endpoint = endpoint.filter(|e| !e.is_empty()).map(cache_key);
        let cached = endpoint
            .as_deref()
            .and_then(|key| self.context.store.get(key))
            .filter(CacheEntry::has_data);

        let initial = match (&endpoint, &cached) {
            (None, _) => QueryState::default(),
            (Some(_), Some(entry)) => QueryState {
                data: entry.data.clone(),
                ..Default::default()
            },
            (Some(_), None) => QueryState {
                loading: true,
                ..Default::default()
            },
        };

        let (state, _) = watch::channel(initial);
        let handle = QueryHandle {
            endpoint,
            scope: Arc::new(Scope {
                state,
                latest: AtomicU64::new(0),
            }),
            context: self.context.clone(),
            listeners: Vec::new(),
        };

        if let Some(key) = handle.endpoint.as_deref() {
            let now = Utc::now();
            match cached {
                Some(entry) if entry.is_stale(options.ttl, now) => {
                    debug!(
                        key = %key,
                        age_ms = entry.age(now).map(|a| a.num_milliseconds()),
                        "Cached data is stale, revalidating"
                    );
                    drop(handle.start(FetchMode::Background));
                }
                Some(_) => debug!(key = %key, "Serving fresh cached data"),
                None => drop(handle.start(FetchMode::Foreground)),
            }
        }

        handle
    }
}

pub struct QueryHandle {
    endpoint: Option<String>,
    scope: Arc<Scope>,
    context: Arc<QueryContext>,
    listeners: Vec<JoinHandle<()>>,
}

impl QueryHandle {
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn state(&self) -> QueryState {
        self.scope.state.borrow().clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.scope.state.borrow().status()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.scope.state.borrow().decode()
    }

    /// Watch for state changes. The receiver reports closed after unmount.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.scope.state.subscribe()
    }

    /// Foreground fetch regardless of cache freshness (user-triggered retry).
    ///
    /// The fetch is already running when this returns; awaiting the future
    /// yields the new payload, dropping it is fine.
    pub fn refetch(&self) -> BoxFuture<'static, Option<Value>> {
        self.start(FetchMode::Foreground)
    }

    /// Refetch whenever the bus carries an event matching `filter`.
    /// The listener stops when this handle is dropped.
    pub fn refetch_on<F>(&mut self, bus: &EventBus, filter: F)
    where
        F: Fn(&DashboardEvent) -> bool + Send + 'static,
    {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!(key = %endpoint, "No runtime, not listening for events");
            return;
        };
        let mut events = bus.subscribe();
        let context = self.context.clone();
        let scope = Arc::downgrade(&self.scope);

        let listener = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                if filter(&event) {
                    debug!(key = %endpoint, event = ?event, "Refetching after event");
                    drop(start_fetch(&context, &endpoint, scope.clone(), FetchMode::Foreground));
                }
            }
        });
        self.listeners.push(listener);
    }

    /// Tear down the view state. In-flight fetches still update the store.
    pub fn unmount(self) {}

    fn start(&self, mode: FetchMode) -> BoxFuture<'static, Option<Value>> {
        match self.endpoint.as_deref() {
            Some(endpoint) => {
                start_fetch(&self.context, endpoint, Arc::downgrade(&self.scope), mode)
            }
            None => future::ready(None).boxed(),
        }
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

/// Apply `f` to the view state if the view is still mounted.
fn update_scope(scope: &Weak<Scope>, f: impl FnOnce(&mut QueryState)) {
    if let Some(scope) = scope.upgrade() {
        scope.state.send_modify(f);
    }
}

/// Apply `f` if the view is still mounted and `id` is its latest fetch.
fn settle_scope(scope: &Weak<Scope>, id: u64, f: impl FnOnce(&mut QueryState)) {
    let Some(scope) = scope.upgrade() else {
        return;
    };
    let applied = scope.state.send_if_modified(|state| {
        if scope.latest.load(Ordering::SeqCst) != id {
            return false;
        }
        f(state);
        true
    });
    if !applied {
        debug!(fetch = id, "Superseded fetch settled, view state left alone");
    }
}

/// Mark a fetch as started and return its id.
fn begin_fetch(scope: &Weak<Scope>, mode: FetchMode) -> u64 {
    let Some(scope) = scope.upgrade() else {
        return 0;
    };
    let id = scope.latest.fetch_add(1, Ordering::SeqCst) + 1;
    scope.state.send_modify(|s| {
        match mode {
            FetchMode::Foreground => s.loading = true,
            FetchMode::Background => s.refreshing = true,
        }
        s.error = None;
    });
    id
}

fn start_fetch(
    context: &Arc<QueryContext>,
    key: &str,
    scope: Weak<Scope>,
    mode: FetchMode,
) -> BoxFuture<'static, Option<Value>> {
    let Some(token) = context.credentials.token() else {
        debug!(key = %key, "No credential, skipping fetch");
        if mode == FetchMode::Foreground {
            update_scope(&scope, |s| s.loading = false);
        }
        return future::ready(None).boxed();
    };

    let context = context.clone();
    let key = key.to_string();

    let Ok(runtime) = Handle::try_current() else {
        debug!(key = %key, "No runtime, fetch runs when awaited");
        if mode == FetchMode::Foreground {
            update_scope(&scope, |s| s.loading = false);
        }
        return async move {
            let id = begin_fetch(&scope, mode);
            finish_fetch(context, key, token, scope, mode, id).await
        }
        .boxed();
    };

    let id = begin_fetch(&scope, mode);
    runtime
        .spawn(finish_fetch(context, key, token, scope, mode, id))
        .map(|joined| joined.ok().flatten())
        .boxed()
}

async fn finish_fetch(
    context: Arc<QueryContext>,
    key: String,
    token: String,
    scope: Weak<Scope>,
    mode: FetchMode,
    id: u64,
) -> Option<Value> {
    match context.client.get_json(&key, &token).await {
        Ok(json) => {
            let now = Utc::now();
            let data = context.store.update(&key, |entry| {
                let entry = entry.unwrap_or_default().with_data(json, now);
                let data = entry.data.clone();
                (entry, data)
            });
            settle_scope(&scope, id, |s| {
                s.data = data.clone();
                s.loading = false;
                s.refreshing = false;
            });
            data
        }
        Err(e) => {
            warn!(
                key = %key,
                error = %e,
                background = mode == FetchMode::Background,
                "Fetch failed"
            );
            settle_scope(&scope, id, |s| {
                s.error = Some(e);
                s.loading = false;
                s.refreshing = false;
            });
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
