//! Build settings
//!
//! Settings are layered, lowest precedence first:
//! - built-in defaults
//! - `<config_dir>/connect-build/config.toml`
//! - `CONNECT_CONTENT_BUILD_DIR` for the build directory
//! - explicit overrides from the caller (CLI flags)

pub mod paths;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use paths::{BUILD_DIR_ENV, DEFAULT_BUILD_DIR, logs_root, normalize_server_url, state_file_path};
pub use store::SettingsStore;

/// Tunables for build runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Directory holding state files and build logs.
    pub build_dir: PathBuf,
    /// Maximum concurrent remote builds.
    pub parallelism: usize,
    /// Seconds between task polls; fractions allowed, must be positive.
    pub poll_wait_secs: f64,
    /// Seconds between progress reports.
    pub monitor_interval_secs: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            parallelism: 1,
            poll_wait_secs: 1.0,
            monitor_interval_secs: 5,
        }
    }
}

impl BuildSettings {
    /// Poll interval, or `None` when `poll_wait_secs` is not a positive duration.
    pub fn poll_wait(&self) -> Option<Duration> {
        poll_interval(self.poll_wait_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Apply `CONNECT_CONTENT_BUILD_DIR` when it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(BUILD_DIR_ENV)
            && !dir.trim().is_empty()
        {
            self.build_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_poll_wait_secs(mut self, secs: f64) -> Self {
        self.poll_wait_secs = secs;
        self
    }

    /// Reject values that would stall a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be at least 1");
        }
        if self.poll_wait().is_none() {
            anyhow::bail!("poll_wait_secs must be greater than 0");
        }
        if self.monitor_interval_secs == 0 {
            anyhow::bail!("monitor_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Convert a poll wait in seconds, rejecting zero, negative and non-finite values.
pub fn poll_interval(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|wait| !wait.is_zero())
}
