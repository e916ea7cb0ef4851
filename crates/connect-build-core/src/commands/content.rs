//! Content build commands.
//!
//! Tracks content for one server (`add`, `rm`), inspects tracked state
//! (`ls`, `history`, `logs`) and starts builds (`run`).

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use crate::build::{BuildCoordinator, RunOptions, RunReport};
use crate::content::{ContentGuidWithBundle, ContentItem};
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::logs::{BuildLogs, HistoryEntry};
use crate::remote::ContentFilter;
use crate::types::BuildStatus;

/// Options for removing tracked content
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub guid: Option<String>,
    pub all: bool,
    /// Also delete the item's build logs
    pub purge: bool,
}

impl RemoveOptions {
    pub fn guid(guid: impl Into<String>) -> Self {
        Self {
            guid: Some(guid.into()),
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }
}

/// Options for listing tracked content
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Specific guids; when set, `status` is ignored
    pub guids: Vec<String>,
    pub status: Option<BuildStatus>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guids(mut self, guids: Vec<String>) -> Self {
        self.guids = guids;
        self
    }

    pub fn with_status(mut self, status: BuildStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(BuildError::InvalidArgument(format!(
                "unknown log format '{}', expected text or json",
                other
            ))),
        }
    }
}

/// Options for showing a build log
#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub guid: String,
    /// Attempt to show; defaults to the most recent one
    pub task_id: Option<String>,
    pub format: LogFormat,
}

impl LogsOptions {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            task_id: None,
            format: LogFormat::Text,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Content build command orchestrator for one server
#[derive(Clone)]
pub struct BuildCommand {
    ctx: BuildContext,
}

impl BuildCommand {
    pub fn new(ctx: BuildContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    fn ensure_idle(&self, action: &str) -> Result<()> {
        if self.ctx.store().running() {
            tracing::warn!(
                server = self.ctx.server_url(),
                "Refusing to {} while a build is running",
                action
            );
            return Err(BuildError::AlreadyRunning {
                server: self.ctx.server_url().to_string(),
            });
        }
        Ok(())
    }

    /// Start tracking content and mark it NEEDS_BUILD.
    ///
    /// An explicit bundle id wins over the server's current bundle.
    pub async fn add(&self, targets: &[ContentGuidWithBundle]) -> Result<Vec<ContentItem>> {
        if targets.is_empty() {
            return Err(BuildError::InvalidArgument(
                "at least one content guid is required".to_string(),
            ));
        }
        self.ensure_idle("add content")?;

        // one item is a direct lookup; several are filtered from one listing
        let filter = match targets {
            [single] => ContentFilter::Guid(single.guid.clone()),
            _ => ContentFilter::All,
        };
        let fetched = self
            .ctx
            .client()
            .fetch_content_items(&filter)
            .await
            .map_err(BuildError::Fetch)?;
        let mut by_guid: BTreeMap<String, ContentItem> = fetched
            .into_iter()
            .map(|item| (item.guid.clone(), item))
            .collect();

        let mut accepted: BTreeMap<String, ContentItem> = BTreeMap::new();
        for target in targets {
            if !accepted.contains_key(&target.guid) {
                let item = by_guid
                    .remove(&target.guid)
                    .ok_or_else(|| BuildError::NotFound {
                        guid: target.guid.clone(),
                    })?;
                accepted.insert(target.guid.clone(), item);
            }
            if let Some(item) = accepted.get_mut(&target.guid)
                && target.bundle_id.is_some()
            {
                item.bundle_id = target.bundle_id.clone();
            }
        }

        if let Some(unpublished) = accepted.values().find(|item| item.bundle_id.is_none()) {
            return Err(BuildError::InvalidArgument(format!(
                "content has never been published to this server; a bundle id is required for the build: {}",
                unpublished.guid
            )));
        }

        self.ctx.store().batch(|txn| {
            for item in accepted.values() {
                txn.add_item(item);
                txn.set_status(&item.guid, BuildStatus::NeedsBuild)?;
            }
            Ok(())
        })?;
        for item in accepted.values() {
            tracing::info!(guid = %item.guid, bundle_id = ?item.bundle_id, "Added content to build");
        }

        accepted
            .keys()
            .map(|guid| self.ctx.store().get_item(guid))
            .collect()
    }

    /// Stop tracking content; returns the removed guids.
    pub fn remove(&self, options: &RemoveOptions) -> Result<Vec<String>> {
        match (&options.guid, options.all) {
            (Some(_), true) => {
                return Err(BuildError::InvalidArgument(
                    "specify either a guid or --all, not both".to_string(),
                ));
            }
            (None, false) => {
                return Err(BuildError::InvalidArgument(
                    "specify a guid or --all".to_string(),
                ));
            }
            _ => {}
        }
        self.ensure_idle("remove content")?;

        let store = self.ctx.store();
        let guids: Vec<String> = match &options.guid {
            Some(guid) => vec![guid.clone()],
            None => store.get_items(None).into_iter().map(|i| i.guid).collect(),
        };

        let mut removed = Vec::with_capacity(guids.len());
        for guid in guids {
            if store.remove_item(&guid, options.purge)? {
                tracing::info!(guid = %guid, purge = options.purge, "Removed content from build");
                removed.push(guid);
            } else {
                tracing::warn!(guid = %guid, "Content is not tracked");
            }
        }
        Ok(removed)
    }

    pub fn list(&self, options: &ListOptions) -> Result<Vec<ContentItem>> {
        let store = self.ctx.store();
        if options.guids.is_empty() {
            return Ok(store.get_items(options.status));
        }
        options
            .guids
            .iter()
            .map(|guid| store.get_item(guid))
            .collect()
    }

    /// Past build attempts, oldest first; empty when nothing was ever built.
    pub fn history(&self, guid: &str) -> Result<Vec<HistoryEntry>> {
        self.ctx.logs().history(guid)
    }

    /// Resolve which log file `options` refers to.
    pub fn log_path(&self, options: &LogsOptions) -> Result<PathBuf> {
        let item = self.ctx.store().get_item(&options.guid)?;
        let path = match &options.task_id {
            Some(task_id) => Some(self.ctx.logs().log_path(&options.guid, task_id)?),
            None => item.last_build_log,
        };
        match path {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(BuildError::InvalidArgument(format!(
                "log file not found for content: {}",
                options.guid
            ))),
        }
    }

    /// Lines of a build log, rendered in the requested format.
    pub fn logs(&self, options: &LogsOptions) -> Result<Vec<String>> {
        let path = self.log_path(options)?;
        let lines = BuildLogs::read_lines(&path)?;
        match options.format {
            LogFormat::Text => Ok(lines),
            LogFormat::Json => lines
                .into_iter()
                .map(|line| {
                    serde_json::to_string(&serde_json::json!({ "message": line }))
                        .map_err(BuildError::from)
                })
                .collect(),
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport> {
        BuildCoordinator::new(self.ctx.clone()).run(options).await
    }

    /// Like [`run`](Self::run), aborting once `interrupt` resolves.
    pub async fn run_until<F>(&self, options: &RunOptions, interrupt: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        BuildCoordinator::new(self.ctx.clone())
            .run_until(options, interrupt)
            .await
    }
}
