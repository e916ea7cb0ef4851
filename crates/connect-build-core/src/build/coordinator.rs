//! Run orchestration: requeue, fan out workers, reconcile, report.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::monitor::{BuildMonitor, BuildSummary};
use super::worker::{BuildWorker, WorkerOutcome};
use crate::config::poll_interval;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::store::BuildStore;
use crate::types::BuildStatus;

/// Options for one `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the configured parallelism.
    pub parallelism: Option<usize>,
    pub aborted: bool,
    pub error: bool,
    pub running: bool,
    pub all: bool,
    /// Same as `aborted`, `error` and `running` together.
    pub retry: bool,
    /// Overrides the configured poll interval, in seconds.
    pub poll_wait_secs: Option<f64>,
    /// Log the full error chain of failed items.
    pub debug: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_poll_wait_secs(mut self, secs: f64) -> Self {
        self.poll_wait_secs = Some(secs);
        self
    }

    pub fn with_all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_aborted(mut self, aborted: bool) -> Self {
        self.aborted = aborted;
        self
    }

    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Statuses to move back to NEEDS_BUILD before selecting work.
    ///
    /// `None` means every tracked item.
    fn requeue(&self) -> Option<Vec<BuildStatus>> {
        if self.all {
            return None;
        }
        let mut statuses = Vec::new();
        if self.aborted || self.retry {
            statuses.push(BuildStatus::Aborted);
        }
        if self.error || self.retry {
            statuses.push(BuildStatus::Error);
        }
        if self.running || self.retry {
            statuses.push(BuildStatus::Running);
        }
        Some(statuses)
    }
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// `None` when there was nothing to build.
    pub summary: Option<BuildSummary>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.summary.as_ref().is_none_or(BuildSummary::succeeded)
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}

/// Clears the running flag exactly once, even on early return.
struct RunningGuard {
    store: Arc<BuildStore>,
    released: bool,
}

impl RunningGuard {
    fn new(store: Arc<BuildStore>) -> Self {
        Self {
            store,
            released: false,
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.store.set_running(false)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::error!(error = %err, "Failed to clear build running flag");
        }
    }
}

pub struct BuildCoordinator {
    ctx: BuildContext,
}

impl BuildCoordinator {
    pub fn new(ctx: BuildContext) -> Self {
        Self { ctx }
    }

    /// Run until all queued items settle; never interrupted.
    pub async fn run(&self, opts: &RunOptions) -> Result<RunReport> {
        self.run_until(opts, std::future::pending::<()>()).await
    }

    /// Run, aborting cooperatively once `interrupt` resolves.
    pub async fn run_until<F>(&self, opts: &RunOptions, interrupt: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let store = Arc::clone(self.ctx.store());
        let settings = self.ctx.settings();
        let parallelism = opts.parallelism.unwrap_or(settings.parallelism);
        if parallelism == 0 {
            return Err(BuildError::InvalidArgument(
                "parallelism must be at least 1".to_string(),
            ));
        }
        let poll_wait_secs = opts.poll_wait_secs.unwrap_or(settings.poll_wait_secs);
        let poll_wait = poll_interval(poll_wait_secs).ok_or_else(|| {
            BuildError::InvalidArgument(format!(
                "poll wait must be greater than 0 seconds, got {}",
                poll_wait_secs
            ))
        })?;

        if store.running() {
            return Err(BuildError::AlreadyRunning {
                server: store.server_url().to_string(),
            });
        }

        let requeue = opts.requeue();
        if requeue.as_ref().is_none_or(|statuses| !statuses.is_empty()) {
            let requeued = store.batch(|txn| {
                let guids: Vec<String> = txn
                    .items(None)
                    .into_iter()
                    .filter(|item| match &requeue {
                        None => true,
                        Some(statuses) => item.status().is_some_and(|s| statuses.contains(&s)),
                    })
                    .map(|item| item.guid)
                    .collect();
                for guid in &guids {
                    txn.set_status(guid, BuildStatus::NeedsBuild)?;
                }
                Ok(guids.len())
            })?;
            tracing::debug!(requeued, "Marked content for rebuild");
        }

        let items = store.get_items(Some(BuildStatus::NeedsBuild));
        if items.is_empty() {
            tracing::info!("Nothing to build");
            return Ok(RunReport { summary: None });
        }
        let guids: Vec<String> = items.iter().map(|item| item.guid.clone()).collect();
        tracing::info!(
            count = items.len(),
            parallelism,
            server = store.server_url(),
            "Starting content build"
        );

        let mut guard = RunningGuard::new(Arc::clone(&store));
        store.set_running(true)?;

        let monitor = BuildMonitor::new(
            Arc::clone(&store),
            guids,
            self.ctx.settings().monitor_interval(),
        );
        let wake = monitor.waker();
        let monitor = tokio::spawn(monitor.run());

        let worker = BuildWorker::new(
            Arc::clone(&store),
            Arc::clone(self.ctx.client()),
            poll_wait,
        );
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut workers = JoinSet::new();
        for item in items {
            let worker = worker.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (item.guid, Ok(WorkerOutcome::Skipped));
                };
                let outcome = worker.build(&item).await;
                (item.guid, outcome)
            });
        }

        let mut fatal: Option<BuildError> = None;
        let mut interrupted = false;
        let mut never_started = 0usize;
        let mut left_running = 0usize;
        let mut interrupt = std::pin::pin!(interrupt);
        loop {
            tokio::select! {
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    store.abort_signal().trigger();
                    wake.notify_one();
                    log_interrupt_hints();
                }
                joined = workers.join_next() => {
                    let Some(joined) = joined else { break };
                    let failure = match joined {
                        Ok((guid, Ok(outcome))) => {
                            match outcome {
                                WorkerOutcome::Skipped => never_started += 1,
                                WorkerOutcome::Interrupted => left_running += 1,
                                WorkerOutcome::Complete | WorkerOutcome::Failed { .. } => {}
                            }
                            tracing::debug!(guid = %guid, outcome = ?outcome, "Worker finished");
                            None
                        }
                        Ok((guid, Err(err))) => self.record_failure(&guid, err, opts.debug),
                        Err(err) => Some(BuildError::from(err)),
                    };
                    if let Some(err) = failure {
                        tracing::error!(error = %err, "Stopping build run");
                        store.abort_signal().trigger();
                        wake.notify_one();
                        fatal.get_or_insert(err);
                    }
                }
            }
        }

        if never_started > 0 || left_running > 0 {
            tracing::warn!(
                never_started,
                left_running,
                "Some content did not finish building in this run"
            );
        }

        let released = guard.release();
        wake.notify_one();
        let summary = monitor.await?;

        if let Some(err) = fatal {
            return Err(err);
        }
        released?;
        Ok(RunReport {
            summary: Some(summary?),
        })
    }

    /// Mark a failed item ERROR; returns the error when it must stop the run.
    fn record_failure(&self, guid: &str, err: BuildError, debug: bool) -> Option<BuildError> {
        if err.is_fatal() {
            return Some(err);
        }
        tracing::error!(guid, error = %err, "Build failed");
        if debug {
            tracing::error!(guid, "{}", error_chain(&err));
        }
        match self.ctx.store().set_status(guid, BuildStatus::Error) {
            Ok(()) => None,
            Err(store_err) => Some(store_err),
        }
    }
}

fn log_interrupt_hints() {
    tracing::warn!("Interrupted; waiting for in-flight builds to reach a checkpoint");
    tracing::warn!("Builds already submitted keep running on the server");
    tracing::warn!("Use `build ls --status RUNNING` to list content that was building");
    tracing::warn!("Use `build run --retry` to rebuild aborted and failed content");
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\n  caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
