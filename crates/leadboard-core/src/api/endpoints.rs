//! Endpoint keys used by the dashboard views.
//!
//! An endpoint key is the literal backend path. It is both the request path
//! and the cache key, so views and prefetchers must use the same string.

pub const PROJECTS: &str = "api/projects";
pub const DELIVERED_PROJECTS: &str = "api/projects/delivered";

pub const AUTH_STATS: &str = "api/auth/stats";
pub const AUTH_USERS: &str = "api/auth/users";
pub const AUTH_ME: &str = "api/auth/me";
pub const AUTH_LOGIN: &str = "api/auth/login";
pub const AUTH_LOGOUT: &str = "api/auth/logout";
pub const AUTH_REGISTER: &str = "api/auth/register";

pub const LEADS_STATS: &str = "api/leads/stats";
pub const LEADS_READY_TO_CALL: &str = "api/leads/ready-to-call";
pub const LEADS_SCHEDULED_CALLS: &str = "api/leads/scheduled-calls";
