//! High-level commands for content builds.
//!
//! These are the operations frontends call; each one works against a single
//! server's [`BuildContext`](crate::context::BuildContext).

pub mod content;

pub use content::{BuildCommand, ListOptions, LogFormat, LogsOptions, RemoveOptions};
