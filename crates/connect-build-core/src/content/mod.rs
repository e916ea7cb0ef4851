//! Tracked content items and the `guid[,bundle_id]` argument form.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::BuildStatus;

/// One unit of remote content tracked for rebuild.
///
/// Descriptive fields mirror the server's v1 content record. The
/// `rsconnect_*` fields are owned by the build store and are only written
/// through its mutation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub guid: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub app_mode: Option<String>,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_deployed_time: Option<String>,
    #[serde(default)]
    pub owner_guid: Option<String>,

    #[serde(
        rename = "rsconnect_build_status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub build_status: Option<BuildStatus>,

    #[serde(
        rename = "rsconnect_last_build_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_build_time: Option<DateTime<Utc>>,

    /// `None` after a failed submission: a build was attempted but no log
    /// was ever created.
    #[serde(rename = "rsconnect_last_build_log", default)]
    pub last_build_log: Option<PathBuf>,

    #[serde(
        rename = "rsconnect_build_task_result",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_build_task_result: Option<BuildTaskResult>,
}

impl ContentItem {
    /// Create a bare item with only identity and build target.
    pub fn new(guid: impl Into<String>, bundle_id: Option<String>) -> Self {
        Self {
            guid: guid.into(),
            bundle_id,
            title: None,
            name: None,
            app_mode: None,
            content_url: None,
            dashboard_url: None,
            created_time: None,
            last_deployed_time: None,
            owner_guid: None,
            build_status: None,
            last_build_time: None,
            last_build_log: None,
            last_build_task_result: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Copy of this item carrying identity and descriptive fields only.
    pub fn skeleton(&self) -> Self {
        Self {
            build_status: None,
            last_build_time: None,
            last_build_log: None,
            last_build_task_result: None,
            ..self.clone()
        }
    }

    pub fn status(&self) -> Option<BuildStatus> {
        self.build_status
    }
}

/// Remote task fields kept in the state file after a build.
///
/// Log output is dropped since it already lives in the build log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTaskResult {
    pub id: String,
    pub finished: bool,
    pub code: i32,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Check that `s` looks like a content guid: hex digits and dashes only.
pub fn parse_guid(s: &str) -> Result<&str, String> {
    let guid = s.trim();
    if guid.is_empty() || !guid.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(format!("Invalid content guid '{}'", s));
    }
    Ok(guid)
}

/// A content guid with an optional bundle to build, parsed from
/// `<guid>` or `<guid>,<bundle_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGuidWithBundle {
    pub guid: String,
    pub bundle_id: Option<String>,
}

impl fmt::Display for ContentGuidWithBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bundle_id {
            Some(bundle_id) => write!(f, "{},{}", self.guid, bundle_id),
            None => f.write_str(&self.guid),
        }
    }
}

impl FromStr for ContentGuidWithBundle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (guid, bundle) = match trimmed.split_once(',') {
            Some((guid, bundle)) => (guid.trim(), Some(bundle.trim())),
            None => (trimmed, None),
        };

        parse_guid(guid).map_err(|_| format!("Failed to parse content guid arg {}", s))?;

        let bundle_id = match bundle {
            None | Some("") => None,
            Some(bundle) => {
                bundle.parse::<u64>().map_err(|_| {
                    format!(
                        "Failed to parse bundle_id. Expected Int, but found: {}",
                        bundle
                    )
                })?;
                Some(bundle.to_string())
            }
        };

        Ok(Self {
            guid: guid.to_string(),
            bundle_id,
        })
    }
}
