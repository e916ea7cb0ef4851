//! Per-attempt build log files.
//!
//! Layout: `<root>/<guid>/<task_id>.log`, where `<root>` is
//! `<build_dir>/logs/<normalized-server>`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};
use crate::store::backend::restrict_permissions;

const LOG_EXTENSION: &str = "log";

/// One past build attempt for a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Time of the attempt's last log write (file modification time).
    pub time: DateTime<Utc>,
    pub task_id: String,
}

#[derive(Debug, Clone)]
pub struct BuildLogs {
    root: PathBuf,
}

impl BuildLogs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The item's log directory; `guid` must be a single path component.
    pub fn dir(&self, guid: &str) -> Result<PathBuf> {
        Ok(self.root.join(file_name("content guid", guid)?))
    }

    /// Create the item's log directory if needed.
    pub fn ensure_dir(&self, guid: &str) -> Result<PathBuf> {
        let dir = self.dir(guid)?;
        fs::create_dir_all(&dir).map_err(|e| BuildError::storage(&dir, e))?;
        restrict_permissions(&dir, 0o700)?;
        Ok(dir)
    }

    pub fn log_path(&self, guid: &str, task_id: &str) -> Result<PathBuf> {
        let task_id = file_name("task id", task_id)?;
        Ok(self.dir(guid)?.join(format!("{}.{}", task_id, LOG_EXTENSION)))
    }

    /// All recorded attempts for `guid`, oldest first.
    ///
    /// Attempts are ordered by the time their log was last written.
    pub fn history(&self, guid: &str) -> Result<Vec<HistoryEntry>> {
        let dir = self.dir(guid)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| BuildError::storage(&dir, e))?;
        let mut history = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BuildError::storage(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(task_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .map_err(|e| BuildError::storage(&path, e))?;
            let time = metadata
                .modified()
                .map_err(|e| BuildError::storage(&path, e))?;
            history.push(HistoryEntry {
                time: DateTime::<Utc>::from(time),
                task_id: task_id.to_string(),
            });
        }

        history.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.task_id.cmp(&b.task_id)));
        Ok(history)
    }

    /// Delete the item's log directory. A missing directory is fine.
    pub fn remove_dir(&self, guid: &str) -> Result<()> {
        let dir = self.dir(guid)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildError::storage(&dir, e)),
        }
    }

    pub fn read_lines(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path).map_err(|e| BuildError::storage(path, e))?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

/// Accept `name` only if joining it onto a directory stays inside that directory.
pub fn file_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(BuildError::InvalidArgument(format!(
            "invalid {} '{}'",
            kind, name
        )));
    }
    Ok(name)
}
