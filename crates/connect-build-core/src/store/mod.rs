//! Build state store.
//!
//! Single source of truth for tracked items and the running flag of one
//! server. Every read-modify-write happens under one lock and, unless run
//! inside [`BuildStore::batch`], is persisted before the lock is released.

pub mod backend;
pub mod state;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::abort::AbortSignal;
use crate::content::ContentItem;
use crate::error::Result;
use crate::logs::BuildLogs;
use crate::remote::TaskStatus;
use crate::types::BuildStatus;

pub use backend::{JsonFileBackend, MemoryBackend, StateBackend};
pub use state::BuildState;

/// Count of items per build status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub needs_build: usize,
    pub running: usize,
    pub complete: usize,
    pub error: usize,
    pub aborted: usize,
}

impl StatusCounts {
    fn record(&mut self, status: Option<BuildStatus>) {
        match status {
            Some(BuildStatus::NeedsBuild) => self.needs_build += 1,
            Some(BuildStatus::Running) => self.running += 1,
            Some(BuildStatus::Complete) => self.complete += 1,
            Some(BuildStatus::Error) => self.error += 1,
            Some(BuildStatus::Aborted) => self.aborted += 1,
            None => {}
        }
    }
}

pub struct BuildStore {
    server_url: String,
    backend: Box<dyn StateBackend>,
    logs: BuildLogs,
    abort: AbortSignal,
    state: Mutex<BuildState>,
}

impl std::fmt::Debug for BuildStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStore")
            .field("server_url", &self.server_url)
            .field("location", &self.backend.location())
            .finish()
    }
}

impl BuildStore {
    /// Load the server's state from `backend`.
    pub fn open(
        server_url: impl Into<String>,
        backend: Box<dyn StateBackend>,
        logs: BuildLogs,
        abort: AbortSignal,
    ) -> Result<Self> {
        let state = backend.load()?;
        let server_url = server_url.into();
        tracing::debug!(
            server = %server_url,
            location = %backend.location(),
            items = state.content.len(),
            "Opened build store"
        );
        Ok(Self {
            server_url,
            backend,
            logs,
            abort,
            state: Mutex::new(state),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    pub fn logs(&self) -> &BuildLogs {
        &self.logs
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn aborted(&self) -> bool {
        self.abort.is_triggered()
    }

    fn lock(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and persist, all under the lock.
    ///
    /// `f` works on a copy that replaces the state only when `f` succeeds,
    /// so a failing closure leaves nothing behind. Once swapped in, the
    /// change stays applied even when the save fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut BuildState) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let mut next = state.clone();
        let value = f(&mut next)?;
        *state = next;
        self.backend.save(&state)?;
        Ok(value)
    }

    /// Run several mutations under one lock and save once at the end.
    pub fn batch<T>(&self, f: impl FnOnce(&mut StateTxn<'_>) -> Result<T>) -> Result<T> {
        self.mutate(|state| f(&mut StateTxn { state }))
    }

    pub fn snapshot(&self) -> BuildState {
        self.lock().clone()
    }

    pub fn add_item(&self, item: &ContentItem) -> Result<()> {
        self.mutate(|state| {
            state.upsert(item);
            Ok(())
        })
    }

    /// Stop tracking `guid`; with `purge` its log directory is deleted too.
    ///
    /// Returns whether the item was tracked. Logs of untracked guids are
    /// never touched.
    pub fn remove_item(&self, guid: &str, purge: bool) -> Result<bool> {
        let removed = self.mutate(|state| Ok(state.content.remove(guid).is_some()))?;
        if removed
            && purge
            && let Err(err) = self.logs.remove_dir(guid)
        {
            tracing::warn!(guid, error = %err, "Failed to purge build logs");
        }
        Ok(removed)
    }

    pub fn set_status(&self, guid: &str, status: BuildStatus) -> Result<()> {
        self.mutate(|state| {
            state.get_mut(guid)?.build_status = Some(status);
            Ok(())
        })
    }

    pub fn touch_last_build_time(&self, guid: &str) -> Result<()> {
        self.mutate(|state| {
            state.get_mut(guid)?.last_build_time = Some(Utc::now());
            Ok(())
        })
    }

    pub fn set_last_build_log(&self, guid: &str, log: Option<PathBuf>) -> Result<()> {
        self.mutate(|state| {
            state.get_mut(guid)?.last_build_log = log;
            Ok(())
        })
    }

    /// Record the finished task without its log output.
    pub fn set_task_result(&self, guid: &str, task: &TaskStatus) -> Result<()> {
        self.mutate(|state| {
            state.get_mut(guid)?.last_build_task_result = Some(task.stripped());
            Ok(())
        })
    }

    pub fn get_item(&self, guid: &str) -> Result<ContentItem> {
        self.lock().get(guid).cloned()
    }

    pub fn get_items(&self, status: Option<BuildStatus>) -> Vec<ContentItem> {
        self.lock().items(status)
    }

    pub fn running(&self) -> bool {
        self.lock().build_running
    }

    pub fn set_running(&self, running: bool) -> Result<()> {
        self.mutate(|state| {
            state.build_running = running;
            Ok(())
        })
    }

    /// Tally statuses of the given items; untracked guids are skipped.
    pub fn tally(&self, guids: &[String]) -> StatusCounts {
        let state = self.lock();
        let mut counts = StatusCounts::default();
        for guid in guids {
            if let Some(item) = state.content.get(guid) {
                counts.record(item.build_status);
            }
        }
        counts
    }

    /// Guids among `guids` currently in `status`.
    pub fn guids_with_status(&self, guids: &[String], status: BuildStatus) -> Vec<String> {
        let state = self.lock();
        guids
            .iter()
            .filter(|guid| {
                state
                    .content
                    .get(guid.as_str())
                    .is_some_and(|item| item.build_status == Some(status))
            })
            .cloned()
            .collect()
    }
}

/// Mutable view handed to [`BuildStore::batch`] closures.
pub struct StateTxn<'a> {
    state: &'a mut BuildState,
}

impl StateTxn<'_> {
    pub fn add_item(&mut self, item: &ContentItem) {
        self.state.upsert(item);
    }

    pub fn set_status(&mut self, guid: &str, status: BuildStatus) -> Result<()> {
        self.state.get_mut(guid)?.build_status = Some(status);
        Ok(())
    }

    pub fn items(&self, status: Option<BuildStatus>) -> Vec<ContentItem> {
        self.state.items(status)
    }
}
