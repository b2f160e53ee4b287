//! Core library for leadboard, a sales-lead and project dashboard.
//!
//! This crate contains everything that sits between the dashboard views and
//! the backend REST API:
//!
//! - `api`: the HTTP client that performs authenticated JSON requests
//! - `auth`: bearer-token storage and the login session
//! - `cache`: the in-memory response cache and the prefetcher that warms it
//! - `query`: cached queries that views mount to read (and revalidate) data
//! - `preload`: lazily loaded views that can be warmed ahead of navigation
//! - `navigation`: turns hover/focus intent on nav items into warm-up work
//! - `events`: a typed in-process event bus for cross-view notifications
//!
//! Nothing in here is global. The host builds one `CacheStore`, one
//! `ApiClient` and one credential source, and hands them to the pieces
//! that need them.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod events;
pub mod models;
pub mod navigation;
pub mod preload;
pub mod query;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialSource, KeyringCredentials, MemoryCredentials, Session};
pub use cache::{CacheEntry, CacheStore, Prefetcher};
pub use config::Config;
pub use events::{DashboardEvent, EventBus};
pub use navigation::{NavIntent, NavKey, Navigation};
pub use preload::{LazyView, RoutePreloader};
pub use query::{QueryClient, QueryHandle, QueryOptions, QueryState, QueryStatus};
