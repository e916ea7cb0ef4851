//! Remote build client seam.
//!
//! Workers and commands only see [`RemoteBuildClient`]; the HTTP
//! implementation lives in [`http`].

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::{BuildTaskResult, ContentItem};
use crate::error::RemoteError;

pub use http::ConnectClient;

/// Which content to fetch from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentFilter {
    /// A single item by guid.
    Guid(String),
    /// Every item visible to the caller.
    All,
}

/// Snapshot of a remote build task, as returned by one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    /// Log lines produced since the requested cursor.
    #[serde(rename = "output", default)]
    pub log_lines: Vec<String>,
    pub finished: bool,
    #[serde(rename = "code", default)]
    pub exit_code: i32,
    #[serde(default)]
    pub error: String,
    /// Cursor to pass as `first` on the next poll.
    #[serde(default)]
    pub last: u64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl TaskStatus {
    /// Task fields worth persisting, without the log output.
    pub fn stripped(&self) -> BuildTaskResult {
        BuildTaskResult {
            id: self.id.clone(),
            finished: self.finished,
            code: self.exit_code,
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }

    /// Trailing lines describing how the task ended.
    pub fn completion_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(serde_json::Value::Object(result)) = &self.result {
            let data = result.get("data").map(value_text).unwrap_or_default();
            let kind = result.get("type").map(value_text).unwrap_or_default();
            if !data.is_empty() || !kind.is_empty() {
                lines.push(format!("{} ({})", data, kind));
            }
        }
        if !self.error.is_empty() {
            lines.push(format!("Error from server: {}", self.error));
        }
        if self.exit_code != 0 {
            lines.push(format!(
                "Task failed. Task exited with status {}.",
                self.exit_code
            ));
        }
        lines
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Operations the orchestrator needs from the publishing server.
#[async_trait]
pub trait RemoteBuildClient: Send + Sync {
    /// Ask the server to rebuild `guid` from `bundle_id`; returns the task id.
    async fn submit_build(
        &self,
        guid: &str,
        bundle_id: Option<&str>,
    ) -> Result<String, RemoteError>;

    /// Fetch task state and log lines starting at `first`.
    async fn poll_task(&self, task_id: &str, first: Option<u64>)
    -> Result<TaskStatus, RemoteError>;

    async fn fetch_content_items(
        &self,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentItem>, RemoteError>;
}
