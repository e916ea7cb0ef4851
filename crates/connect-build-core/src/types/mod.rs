//! Shared core types used across the store, workers and commands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build status of a tracked content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Marked for build.
    NeedsBuild,
    /// Running now.
    Running,
    /// Cancelled while running.
    Aborted,
    /// Completed successfully.
    Complete,
    /// Completed with an error.
    Error,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 5] = [
        BuildStatus::NeedsBuild,
        BuildStatus::Running,
        BuildStatus::Aborted,
        BuildStatus::Complete,
        BuildStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::NeedsBuild => "NEEDS_BUILD",
            BuildStatus::Running => "RUNNING",
            BuildStatus::Aborted => "ABORTED",
            BuildStatus::Complete => "COMPLETE",
            BuildStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        BuildStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown build status '{}'. Expected one of: NEEDS_BUILD, RUNNING, ABORTED, COMPLETE, ERROR",
                    s
                )
            })
    }
}
