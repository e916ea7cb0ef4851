//! Build execution: one coordinator per run, a bounded pool of workers and
//! a single monitor task.

pub mod coordinator;
pub mod monitor;
pub mod worker;

pub use coordinator::{BuildCoordinator, RunOptions, RunReport};
pub use monitor::{BuildMonitor, BuildSummary};
pub use worker::{BuildWorker, WorkerOutcome};
