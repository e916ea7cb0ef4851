#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use connect_build_core::config::BuildSettings;
use connect_build_core::content::ContentItem;
use connect_build_core::context::BuildContext;
use connect_build_core::error::{BuildError, RemoteError};
use connect_build_core::remote::{ContentFilter, RemoteBuildClient, TaskStatus};
use connect_build_core::store::{BuildState, MemoryBackend, StateBackend};
use connect_build_core::types::BuildStatus;

pub const SERVER: &str = "https://connect.example.com";

/// How the scripted server treats a build for one guid.
#[derive(Debug, Clone)]
pub enum Script {
    /// Streams the lines over two polls, then exits 0.
    Succeed(Vec<String>),
    /// Finishes with the given exit code and error text.
    Fail { code: i32, error: String },
    /// Rejects the build request.
    RejectSubmit,
    /// Accepts the build, then fails every poll.
    PollError,
    /// Never finishes.
    Hang,
    /// Signals `hung` on the first poll, then reports success after a delay.
    FinishLate,
}

#[derive(Debug, Clone)]
struct Task {
    script: Script,
    polls: usize,
}

#[derive(Default)]
pub struct ScriptedClient {
    catalog: Mutex<Vec<ContentItem>>,
    scripts: Mutex<HashMap<String, Script>>,
    tasks: Mutex<HashMap<String, Task>>,
    submissions: Mutex<Vec<(String, Option<String>)>>,
    cursors: Mutex<Vec<Option<u64>>>,
    fetches: Mutex<Vec<ContentFilter>>,
    hung: Arc<Notify>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(self, item: ContentItem) -> Self {
        self.catalog.lock().unwrap().push(item);
        self
    }

    pub fn with_script(self, guid: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(guid.to_string(), script);
        self
    }

    /// Guids (with bundle ids) that were submitted, in order.
    pub fn submissions(&self) -> Vec<(String, Option<String>)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn cursors(&self) -> Vec<Option<u64>> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<ContentFilter> {
        self.fetches.lock().unwrap().clone()
    }

    /// Notified the first time a hanging or late task is polled.
    pub fn hung(&self) -> Arc<Notify> {
        Arc::clone(&self.hung)
    }

    fn script_for(&self, guid: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(guid)
            .cloned()
            .unwrap_or_else(|| Script::Succeed(vec![format!("built {}", guid)]))
    }
}

fn status(
    task_id: &str,
    lines: Vec<String>,
    finished: bool,
    code: i32,
    error: &str,
    last: u64,
) -> TaskStatus {
    TaskStatus {
        id: task_id.to_string(),
        log_lines: lines,
        finished,
        exit_code: code,
        error: error.to_string(),
        last,
        result: None,
    }
}

#[async_trait]
impl RemoteBuildClient for ScriptedClient {
    async fn submit_build(
        &self,
        guid: &str,
        bundle_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let script = self.script_for(guid);
        if matches!(script, Script::RejectSubmit) {
            return Err(RemoteError::Rejected(format!("bundle not found for {}", guid)));
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((guid.to_string(), bundle_id.map(str::to_string)));
        let task_id = format!("task-{}-{}", guid, submissions.len());
        self.tasks
            .lock()
            .unwrap()
            .insert(task_id.clone(), Task { script, polls: 0 });
        Ok(task_id)
    }

    async fn poll_task(
        &self,
        task_id: &str,
        first: Option<u64>,
    ) -> Result<TaskStatus, RemoteError> {
        self.cursors.lock().unwrap().push(first);
        let task = {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| RemoteError::Rejected(format!("unknown task {}", task_id)))?;
            task.polls += 1;
            task.clone()
        };

        match task.script {
            Script::Succeed(lines) => {
                let split = lines.len().min(1);
                if task.polls == 1 {
                    Ok(status(task_id, lines[..split].to_vec(), false, 0, "", split as u64))
                } else {
                    Ok(status(task_id, lines[split..].to_vec(), true, 0, "", lines.len() as u64))
                }
            }
            Script::Fail { code, error } => Ok(status(
                task_id,
                vec!["Bundle restore failed".to_string()],
                true,
                code,
                &error,
                1,
            )),
            Script::PollError => Err(RemoteError::Status {
                status: 502,
                url: format!("{}/__api__/v1/tasks/{}", SERVER, task_id),
                message: "bad gateway".to_string(),
            }),
            Script::Hang => {
                if task.polls == 1 {
                    self.hung.notify_one();
                }
                tokio::task::yield_now().await;
                Ok(status(task_id, Vec::new(), false, 0, "", 0))
            }
            Script::FinishLate => {
                self.hung.notify_one();
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(status(task_id, vec!["built late".to_string()], true, 0, "", 1))
            }
            Script::RejectSubmit => unreachable!("rejected builds have no task"),
        }
    }

    async fn fetch_content_items(
        &self,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentItem>, RemoteError> {
        self.fetches.lock().unwrap().push(filter.clone());
        let catalog = self.catalog.lock().unwrap();
        match filter {
            ContentFilter::All => Ok(catalog.clone()),
            ContentFilter::Guid(guid) => catalog
                .iter()
                .find(|item| &item.guid == guid)
                .cloned()
                .map(|item| vec![item])
                .ok_or_else(|| RemoteError::Status {
                    status: 404,
                    url: format!("{}/__api__/v1/content/{}", SERVER, guid),
                    message: "content not found".to_string(),
                }),
        }
    }
}

pub fn settings(build_dir: &Path) -> BuildSettings {
    BuildSettings::default()
        .with_build_dir(build_dir)
        .with_poll_wait_secs(0.01)
}

pub fn context(build_dir: &Path, client: Arc<ScriptedClient>) -> BuildContext {
    BuildContext::open(SERVER, client, settings(build_dir)).unwrap()
}

/// Track `guid` with `status` without going through the server.
pub fn seed(ctx: &BuildContext, items: &[(&str, BuildStatus)]) {
    ctx.store()
        .batch(|txn| {
            for (guid, status) in items {
                txn.add_item(&ContentItem::new(*guid, Some("1".to_string())));
                txn.set_status(guid, *status)?;
            }
            Ok(())
        })
        .unwrap();
}

pub fn status_of(ctx: &BuildContext, guid: &str) -> Option<BuildStatus> {
    ctx.store().get_item(guid).unwrap().status()
}

/// State backend whose saves start failing once `fails_on` matches the state.
pub struct FailingBackend {
    inner: MemoryBackend,
    fails_on: fn(&BuildState) -> bool,
}

impl FailingBackend {
    pub fn new(fails_on: fn(&BuildState) -> bool) -> Self {
        Self {
            inner: MemoryBackend::new(),
            fails_on,
        }
    }
}

impl StateBackend for FailingBackend {
    fn load(&self) -> Result<BuildState, BuildError> {
        self.inner.load()
    }

    fn save(&self, state: &BuildState) -> Result<(), BuildError> {
        if (self.fails_on)(state) {
            return Err(BuildError::Storage {
                path: PathBuf::from("failing.json"),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.save(state)
    }

    fn location(&self) -> String {
        "failing".to_string()
    }
}
