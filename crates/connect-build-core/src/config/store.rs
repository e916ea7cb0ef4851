//! Loads settings from config.toml.

use std::path::PathBuf;

use anyhow::Context;

use super::BuildSettings;

#[derive(Debug, Clone)]
pub struct SettingsStore {
    config_path: PathBuf,
}

impl SettingsStore {
    /// Store at `<config_dir>/connect-build/config.toml`.
    pub fn from_default_location() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("connect-build");
        Ok(Self::from_dir(config_dir))
    }

    pub fn from_dir(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("config.toml"),
        }
    }

    pub fn load(&self) -> anyhow::Result<BuildSettings> {
        if !self.config_path.exists() {
            return Ok(BuildSettings::default());
        }
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })
    }
}
