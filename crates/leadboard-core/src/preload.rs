//! Lazily loaded views that can be warmed before navigation.
//!
//! A `LazyView` runs its loader at most once successfully and shares the
//! result. `preload` starts that load in the background and swallows any
//! failure; the view then simply loads when it is actually opened.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::navigation::NavKey;

type Loader<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

/// Clone is cheap; clones share the loaded view.
pub struct LazyView<V> {
    name: &'static str,
    loader: Loader<V>,
    cell: Arc<OnceCell<Arc<V>>>,
}

impl<V> Clone for LazyView<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            loader: self.loader.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<V: Send + Sync + 'static> LazyView<V> {
    pub fn new<F, Fut>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            name,
            loader: Arc::new(move || loader().boxed()),
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Load the view, or return the already loaded one. Concurrent callers
    /// share a single load; a failed load is retried by the next caller.
    pub async fn load(&self) -> Result<Arc<V>> {
        let view = self
            .cell
            .get_or_try_init(|| async {
                debug!(view = self.name, "Loading view");
                (self.loader)().await.map(Arc::new)
            })
            .await?;
        Ok(view.clone())
    }

    /// Start loading in the background. Never fails.
    pub fn preload(&self) {
        if self.is_loaded() {
            return;
        }
        let view = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = view.load().await {
                        debug!(
                            view = view.name,
                            error = %e,
                            "Preload failed, view will load on open"
                        );
                    }
                });
            }
            Err(_) => debug!(view = self.name, "No runtime, skipping preload"),
        }
    }
}

/// Type-erased preload so views of different types share one table.
pub trait Preload: Send + Sync {
    fn preload(&self);
}

impl<V: Send + Sync + 'static> Preload for LazyView<V> {
    fn preload(&self) {
        LazyView::preload(self);
    }
}

/// Nav key to the view it opens.
#[derive(Default)]
pub struct RoutePreloader {
    views: HashMap<NavKey, Arc<dyn Preload>>,
}

impl RoutePreloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<V: Send + Sync + 'static>(&mut self, key: NavKey, view: LazyView<V>) {
        self.views.insert(key, Arc::new(view));
    }

    /// Warm the view behind `key`. Returns false when nothing is registered.
    pub fn preload(&self, key: NavKey) -> bool {
        match self.views.get(&key) {
            Some(view) => {
                view.preload();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_view(loads: Arc<AtomicUsize>) -> LazyView<String> {
        LazyView::new("projects", move || {
            let loads = loads.clone();
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, anyhow::Error>("projects view".to_string())
            }
        })
    }

    async fn wait_loaded<V: Send + Sync + 'static>(view: &LazyView<V>) {
        for _ in 0..100 {
            if view.is_loaded() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_preload_then_load_runs_loader_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let view = counting_view(loads.clone());

        view.preload();
        view.preload();
        let loaded = view.load().await.unwrap();
        assert_eq!(loaded.as_str(), "projects view");

        view.preload();
        view.load().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let view: LazyView<u32> = LazyView::new("admin", move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    anyhow::bail!("chunk failed to load");
                }
                Ok::<u32, anyhow::Error>(7)
            }
        });

        view.preload();
        for _ in 0..100 {
            if attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!view.is_loaded());

        assert_eq!(*view.load().await.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_route_preloader_by_key() {
        let loads = Arc::new(AtomicUsize::new(0));
        let view = counting_view(loads.clone());
        let mut routes = RoutePreloader::new();
        routes.register(NavKey::Projects, view.clone());

        assert!(routes.preload(NavKey::Projects));
        assert!(!routes.preload(NavKey::Admin));

        wait_loaded(&view).await;
        assert!(view.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_preload_outside_runtime_does_not_panic() {
        let view = counting_view(Arc::new(AtomicUsize::new(0)));
        view.preload();
        assert!(!view.is_loaded());
    }
}
