//! Persisted build state for one server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::ContentItem;
use crate::error::{BuildError, Result};
use crate::types::BuildStatus;

/// Everything tracked for one server: the running flag and the items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    #[serde(rename = "rsconnect_build_running", default)]
    pub build_running: bool,

    #[serde(rename = "rsconnect_content", default)]
    pub content: BTreeMap<String, ContentItem>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guid: &str) -> Result<&ContentItem> {
        self.content.get(guid).ok_or_else(|| BuildError::NotFound {
            guid: guid.to_string(),
        })
    }

    pub fn get_mut(&mut self, guid: &str) -> Result<&mut ContentItem> {
        self.content.get_mut(guid).ok_or_else(|| BuildError::NotFound {
            guid: guid.to_string(),
        })
    }

    /// Insert or refresh an item's identity and descriptive fields.
    ///
    /// Build-tracking fields of an existing entry are kept.
    pub fn upsert(&mut self, item: &ContentItem) {
        let skeleton = item.skeleton();
        match self.content.get_mut(&item.guid) {
            Some(existing) => {
                *existing = ContentItem {
                    build_status: existing.build_status,
                    last_build_time: existing.last_build_time,
                    last_build_log: existing.last_build_log.take(),
                    last_build_task_result: existing.last_build_task_result.take(),
                    ..skeleton
                };
            }
            None => {
                self.content.insert(item.guid.clone(), skeleton);
            }
        }
    }

    pub fn items(&self, status: Option<BuildStatus>) -> Vec<ContentItem> {
        self.content
            .values()
            .filter(|item| status.is_none() || item.build_status == status)
            .cloned()
            .collect()
    }
}
