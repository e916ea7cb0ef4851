//! Connect Build Core Library
//!
//! Tracks content items on a publishing server and rebuilds them remotely
//! with a bounded pool of workers, persisting progress per server.

pub mod abort;
pub mod build;
pub mod commands;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod logs;
pub mod remote;
pub mod store;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Build
    pub use crate::build::{BuildCoordinator, BuildSummary, RunOptions, RunReport};

    // Commands
    pub use crate::commands::{BuildCommand, ListOptions, LogFormat, LogsOptions, RemoveOptions};

    // Configuration
    pub use crate::config::{BuildSettings, SettingsStore};

    // Content
    pub use crate::content::{ContentGuidWithBundle, ContentItem};
    pub use crate::context::BuildContext;
    pub use crate::error::{BuildError, RemoteError};

    // Remote
    pub use crate::remote::{ConnectClient, ContentFilter, RemoteBuildClient, TaskStatus};

    // Store
    pub use crate::store::{BuildStore, StatusCounts};
    pub use crate::types::BuildStatus;
}
