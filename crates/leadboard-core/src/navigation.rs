//! Navigation intent: hovering or focusing a nav item warms both the view it
//! opens and the data that view reads, so the view renders from cache when
//! the user actually clicks.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::api::endpoints;
use crate::cache::Prefetcher;
use crate::preload::RoutePreloader;

/// Main navigation items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavKey {
    Dashboard,
    Admin,
    Projects,
    Delivered,
}

impl NavKey {
    pub const ALL: [NavKey; 4] = [
        NavKey::Dashboard,
        NavKey::Admin,
        NavKey::Projects,
        NavKey::Delivered,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            NavKey::Dashboard => "Dashboard",
            NavKey::Admin => "Admin",
            NavKey::Projects => "Projects",
            NavKey::Delivered => "Delivered",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            NavKey::Dashboard => "/dashboard",
            NavKey::Admin => "/admin",
            NavKey::Projects => "/projects",
            NavKey::Delivered => "/delivered",
        }
    }

    /// Nav item that is active for `path`, matched exactly.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.path() == path)
    }

    pub fn admin_only(&self) -> bool {
        matches!(self, NavKey::Admin)
    }

    /// Endpoints the view behind this item reads on mount, in prefetch order.
    pub fn prefetch_endpoints(&self) -> &'static [&'static str] {
        match self {
            NavKey::Dashboard | NavKey::Projects => &[endpoints::PROJECTS],
            NavKey::Delivered => &[endpoints::DELIVERED_PROJECTS],
            NavKey::Admin => &[endpoints::AUTH_STATS, endpoints::AUTH_USERS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    PointerEnter,
    Focus,
}

#[derive(Clone)]
pub struct Navigation {
    prefetcher: Prefetcher,
    routes: Arc<RoutePreloader>,
}

impl Navigation {
    pub fn new(prefetcher: Prefetcher, routes: RoutePreloader) -> Self {
        Self {
            prefetcher,
            routes: Arc::new(routes),
        }
    }

    /// Items shown in the nav bar; admin items only for admins.
    pub fn items(is_admin: bool) -> Vec<NavKey> {
        NavKey::ALL
            .into_iter()
            .filter(|key| is_admin || !key.admin_only())
            .collect()
    }

    /// React to hover/focus on a nav item. Fire-and-forget.
    pub fn on_intent(&self, key: NavKey, intent: NavIntent) {
        debug!(key = ?key, intent = ?intent, "Navigation intent");
        self.preload_route(key);
        drop(self.preload_data(key));
    }

    pub fn preload_route(&self, key: NavKey) -> bool {
        self.routes.preload(key)
    }

    /// Prefetch the endpoints behind `key`, one after another. The returned
    /// future completes once all of them settled; dropping it is fine.
    pub fn preload_data(&self, key: NavKey) -> BoxFuture<'static, ()> {
        let prefetcher = self.prefetcher.clone();
        let warm = async move {
            for endpoint in key.prefetch_endpoints() {
                if let Err(e) = prefetcher.prefetch(endpoint).await {
                    debug!(key = ?key, endpoint = endpoint, error = %e, "Prefetch failed");
                }
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime.spawn(warm).map(|_| ()).boxed(),
            Err(_) => warm.boxed(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
