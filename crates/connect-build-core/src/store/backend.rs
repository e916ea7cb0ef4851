//! Persistence backends for [`BuildState`].
//!
//! The store owns locking; a backend only knows how to read and write one
//! whole state document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::state::BuildState;
use crate::error::{BuildError, Result};

pub trait StateBackend: Send + Sync {
    /// Load the state, or an empty one when nothing usable is stored.
    fn load(&self) -> Result<BuildState>;

    /// Replace the stored state.
    fn save(&self, state: &BuildState) -> Result<()>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}

/// JSON state file written atomically (tmp + rename).
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "state.json".to_string());
        self.path
            .with_file_name(format!("{}.{}.tmp", file_name, std::process::id()))
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<BuildState> {
        if !self.path.exists() {
            return Ok(BuildState::new());
        }

        let bytes = fs::read(&self.path).map_err(|e| BuildError::storage(&self.path, e))?;
        match serde_json::from_slice::<BuildState>(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Ignoring malformed build state file; starting with empty state"
                );
                Ok(BuildState::new())
            }
        }
    }

    fn save(&self, state: &BuildState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| BuildError::storage(parent, e))?;
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, bytes).map_err(|e| BuildError::storage(&tmp_path, e))?;
        restrict_permissions(&tmp_path, 0o600)?;

        // rename replaces the target atomically on unix; Windows needs it gone first
        if cfg!(windows) && self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| BuildError::storage(&self.path, e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| BuildError::storage(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), items = state.content.len(), "Saved build state");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps the state in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<BuildState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved state, if any save happened.
    pub fn saved(&self) -> Option<BuildState> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<BuildState> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, state: &BuildState) -> Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| BuildError::storage(path, e))
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
