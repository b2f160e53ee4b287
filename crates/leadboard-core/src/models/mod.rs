//! Typed payloads for the endpoints the dashboard reads.
//!
//! The cache stores raw JSON; views decode into these types with
//! `QueryState::decode`.
//!
//! - `Project`, `ProjectsResponse`: client project pipeline
//! - `User`, `Role`, `UsersResponse`: admin user management
//! - `UserStats`, `StatsResponse`: admin dashboard counters

pub mod project;
pub mod user;

pub use project::{Project, ProjectsResponse};
pub use user::{Role, StatsResponse, User, UserStats, UsersResponse};
