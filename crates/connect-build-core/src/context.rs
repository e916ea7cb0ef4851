//! Build context for dependency injection.

use std::path::Path;
use std::sync::Arc;

use crate::abort::AbortSignal;
use crate::config::{BuildSettings, logs_root, state_file_path};
use crate::error::Result;
use crate::logs::BuildLogs;
use crate::remote::RemoteBuildClient;
use crate::store::{BuildStore, JsonFileBackend, StateBackend};

/// Everything a build run needs for one server.
///
/// Frontends create this once per process and server and hand it to
/// commands; it is the only owner of the server's [`BuildStore`].
#[derive(Clone)]
pub struct BuildContext {
    store: Arc<BuildStore>,
    client: Arc<dyn RemoteBuildClient>,
    settings: BuildSettings,
}

impl BuildContext {
    pub fn new(
        store: Arc<BuildStore>,
        client: Arc<dyn RemoteBuildClient>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            store,
            client,
            settings,
        }
    }

    /// Open the JSON state file and log root under `settings.build_dir`.
    pub fn open(
        server_url: &str,
        client: Arc<dyn RemoteBuildClient>,
        settings: BuildSettings,
    ) -> Result<Self> {
        let backend = JsonFileBackend::new(state_file_path(&settings.build_dir, server_url));
        Self::with_backend(server_url, Box::new(backend), client, settings)
    }

    /// Use a custom state backend; logs still live under `settings.build_dir`.
    pub fn with_backend(
        server_url: &str,
        backend: Box<dyn StateBackend>,
        client: Arc<dyn RemoteBuildClient>,
        settings: BuildSettings,
    ) -> Result<Self> {
        let logs = BuildLogs::new(logs_root(&settings.build_dir, server_url));
        let store = BuildStore::open(server_url, backend, logs, AbortSignal::new())?;
        Ok(Self::new(Arc::new(store), client, settings))
    }

    pub fn store(&self) -> &Arc<BuildStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn RemoteBuildClient> {
        &self.client
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn logs(&self) -> &BuildLogs {
        self.store.logs()
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        self.store.abort_signal()
    }

    pub fn server_url(&self) -> &str {
        self.store.server_url()
    }

    pub fn build_dir(&self) -> &Path {
        &self.settings.build_dir
    }
}
