//! Utility functions for formatting activity entries.

pub mod format;

pub use format::{format_duration_ms, preview};
