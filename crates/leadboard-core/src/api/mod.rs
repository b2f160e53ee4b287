//! REST API client module for the leadboard backend.
//!
//! This module provides the `ApiClient` used by the cache, the prefetcher and
//! the auth session. All requests carry the user's JWT as a bearer token and
//! exchange JSON bodies.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
