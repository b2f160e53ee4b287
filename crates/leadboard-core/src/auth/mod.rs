//! Authentication module for the bearer token and the login session.
//!
//! This module provides:
//! - `CredentialSource`: where the bearer token lives (keychain or memory)
//! - `Session`: login, logout, registration and the current user
//!
//! A missing token is a normal state. Fetch paths skip the request instead
//! of failing.

pub mod credentials;
pub mod session;

pub use credentials::{CredentialSource, KeyringCredentials, MemoryCredentials};
pub use session::{AuthError, RegisterRequest, Session};
