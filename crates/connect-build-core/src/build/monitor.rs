//! Progress reporting and abort reconciliation for one run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::Result;
use crate::store::{BuildStore, StatusCounts};
use crate::types::BuildStatus;

/// Final tally of a run, as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub total: usize,
    pub counts: StatusCounts,
    pub elapsed: Duration,
    pub aborted: bool,
}

impl BuildSummary {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.counts.error == 0
    }

    /// Elapsed time rounded to whole seconds, as `H:MM:SS`.
    pub fn elapsed_display(&self) -> String {
        let secs = (self.elapsed.as_millis() + 500) / 1000;
        format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

/// Watches the items of a single run until the running flag drops.
///
/// The monitor is the only place RUNNING items become ABORTED.
pub struct BuildMonitor {
    store: Arc<BuildStore>,
    guids: Vec<String>,
    interval: Duration,
    wake: Arc<Notify>,
}

impl BuildMonitor {
    pub fn new(store: Arc<BuildStore>, guids: Vec<String>, interval: Duration) -> Self {
        Self {
            store,
            guids,
            interval,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle used to cut the current sleep short when the run ends or aborts.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub async fn run(self) -> Result<BuildSummary> {
        let started = Instant::now();

        while self.store.running() && !self.store.aborted() {
            self.pause().await;
            if self.store.running() && !self.store.aborted() {
                let counts = self.store.tally(&self.guids);
                tracing::info!(
                    "Running = {}, Pending = {}, Success = {}, Error = {}",
                    counts.running,
                    counts.needs_build,
                    counts.complete,
                    counts.error
                );
            }
        }

        let aborted = self.store.aborted();
        if aborted {
            while self.store.running() {
                self.pause().await;
            }
            // memory takes every update even when a save fails
            let mut first_err = None;
            for guid in self.store.guids_with_status(&self.guids, BuildStatus::Running) {
                tracing::warn!(guid = %guid, "Build aborted");
                if let Err(err) = self.store.set_status(&guid, BuildStatus::Aborted) {
                    first_err.get_or_insert(err);
                }
            }
            if let Some(err) = first_err {
                return Err(err);
            }
        }

        let summary = BuildSummary {
            total: self.guids.len(),
            counts: self.store.tally(&self.guids),
            elapsed: started.elapsed(),
            aborted,
        };

        if aborted {
            tracing::warn!(
                complete = summary.counts.complete,
                error = summary.counts.error,
                aborted = summary.counts.aborted,
                "Build aborted after {}",
                summary.elapsed_display()
            );
        } else {
            tracing::info!(
                "{}/{} content builds completed in {}",
                summary.counts.complete,
                summary.total,
                summary.elapsed_display()
            );
            if summary.counts.error > 0 {
                tracing::error!(
                    "{} content builds failed; see `build ls --status ERROR`",
                    summary.counts.error
                );
            }
        }

        Ok(summary)
    }

    async fn pause(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => {}
            _ = self.wake.notified() => {}
        }
    }
}
