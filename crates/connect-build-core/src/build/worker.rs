//! Drives one content item through one remote build attempt.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::content::ContentItem;
use crate::error::{BuildError, Result};
use crate::remote::{RemoteBuildClient, TaskStatus};
use crate::store::BuildStore;
use crate::types::BuildStatus;

/// How a single build attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The run was already aborted; the server was never contacted.
    Skipped,
    /// Remote task exited with code 0.
    Complete,
    /// Remote task exited with a non-zero code.
    Failed { exit_code: i32 },
    /// Abort fired while polling; status is left RUNNING for the monitor.
    Interrupted,
}

#[derive(Clone)]
pub struct BuildWorker {
    store: Arc<BuildStore>,
    client: Arc<dyn RemoteBuildClient>,
    poll_wait: Duration,
}

impl BuildWorker {
    pub fn new(
        store: Arc<BuildStore>,
        client: Arc<dyn RemoteBuildClient>,
        poll_wait: Duration,
    ) -> Self {
        Self {
            store,
            client,
            poll_wait,
        }
    }

    pub async fn build(&self, item: &ContentItem) -> Result<WorkerOutcome> {
        if self.store.aborted() {
            return Ok(WorkerOutcome::Skipped);
        }

        let guid = item.guid.as_str();
        tracing::info!(guid, "Starting build");
        self.store.touch_last_build_time(guid)?;
        self.store.set_status(guid, BuildStatus::Running)?;
        self.store.logs().ensure_dir(guid)?;

        let task_id = match self
            .client
            .submit_build(guid, item.bundle_id.as_deref())
            .await
        {
            Ok(task_id) => task_id,
            Err(source) => {
                // no log file will exist for this attempt
                self.store.set_last_build_log(guid, None)?;
                return Err(BuildError::Submission {
                    guid: guid.to_string(),
                    source,
                });
            }
        };

        let log_path = self.store.logs().log_path(guid, &task_id)?;
        let polled = self.stream_task(guid, &task_id, &log_path).await;
        self.store.set_last_build_log(guid, Some(log_path))?;

        let Some(task) = polled? else {
            tracing::warn!(guid, task_id = %task_id, "Build interrupted while polling");
            return Ok(WorkerOutcome::Interrupted);
        };
        // a task that finishes after the abort still belongs to the aborted run
        if self.store.aborted() {
            tracing::warn!(
                guid,
                task_id = %task_id,
                exit_code = task.exit_code,
                "Build finished after abort; leaving it for the monitor"
            );
            return Ok(WorkerOutcome::Interrupted);
        }

        self.store.set_task_result(guid, &task)?;
        if task.exit_code == 0 {
            tracing::info!(guid, "Build succeeded");
            self.store.set_status(guid, BuildStatus::Complete)?;
            Ok(WorkerOutcome::Complete)
        } else {
            tracing::error!(guid, exit_code = task.exit_code, "Build failed");
            self.store.set_status(guid, BuildStatus::Error)?;
            Ok(WorkerOutcome::Failed {
                exit_code: task.exit_code,
            })
        }
    }

    /// Poll until the task finishes, appending its output to `log_path`.
    ///
    /// Returns `None` when the abort signal stopped polling.
    async fn stream_task(
        &self,
        guid: &str,
        task_id: &str,
        log_path: &Path,
    ) -> Result<Option<TaskStatus>> {
        let log_error = |source: std::io::Error| BuildError::Log {
            path: log_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::create(log_path).await.map_err(log_error)?;
        let mut log = BufWriter::new(file);

        let mut first = None;
        let outcome = loop {
            if self.store.aborted() {
                break Ok(None);
            }

            let task = match self.client.poll_task(task_id, first).await {
                Ok(task) => task,
                Err(source) => {
                    break Err(BuildError::Poll {
                        guid: guid.to_string(),
                        task_id: task_id.to_string(),
                        source,
                    });
                }
            };

            if let Err(err) = write_lines(&mut log, &task.log_lines).await {
                break Err(log_error(err));
            }
            first = Some(task.last);

            if task.finished {
                if let Err(err) = write_lines(&mut log, &task.completion_lines()).await {
                    break Err(log_error(err));
                }
                break Ok(Some(task));
            }

            tokio::time::sleep(self.poll_wait).await;
        };

        log.flush().await.map_err(log_error)?;
        outcome
    }
}

async fn write_lines(
    log: &mut BufWriter<tokio::fs::File>,
    lines: &[String],
) -> std::io::Result<()> {
    for line in lines {
        log.write_all(line.as_bytes()).await?;
        log.write_all(b"\n").await?;
    }
    Ok(())
}
