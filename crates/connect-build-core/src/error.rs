//! Error taxonomy for build orchestration.

use std::path::PathBuf;

/// Failures talking to the remote server.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("invalid server URL '{0}'")]
    InvalidUrl(String),

    #[error("{0}")]
    Rejected(String),
}

/// Errors surfaced by the build store, workers and coordinator.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("there is already a build running on this server: {server}")]
    AlreadyRunning { server: String },

    #[error("content item with guid {guid} not found")]
    NotFound { guid: String },

    #[error("failed to submit build for {guid}")]
    Submission {
        guid: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to poll build task {task_id} for {guid}")]
    Poll {
        guid: String,
        task_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to fetch content from server")]
    Fetch(#[source] RemoteError),

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write build log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode build state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("build task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BuildError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Store-level failures stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Encode(_))
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
