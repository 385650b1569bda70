//! Configuration management for stream-restore
//!
//! Handles loading, parsing, and validation of the YAML configuration file.

use crate::engine::RestoreOptions;
use crate::paths::AppPaths;
use crate::seed::SeedTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RestoreConfig {
    /// Remember and restore the device streams are routed to
    #[serde(default = "default_true")]
    pub restore_device: bool,
    #[serde(default = "default_true")]
    pub restore_volume: bool,
    #[serde(default = "default_true")]
    pub restore_muted: bool,
    /// Move streams to their remembered device when it appears
    #[serde(default = "default_true")]
    pub on_hotplug: bool,
    /// Move streams to their remembered device when their current one disappears
    #[serde(default = "default_true")]
    pub on_rescue: bool,
    /// Seed table with default volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_table: Option<PathBuf>,
    /// Preference database directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Delay between the first change and the flush to disk
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            restore_device: true,
            restore_volume: true,
            restore_muted: true,
            on_hotplug: true,
            on_rescue: true,
            fallback_table: None,
            database: None,
            save_interval_ms: default_save_interval_ms(),
        }
    }
}

impl RestoreConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RestoreConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.save_interval_ms == 0 {
            anyhow::bail!("save_interval_ms must be greater than 0");
        }

        if let Some(table) = &self.fallback_table {
            if table.as_os_str().is_empty() {
                anyhow::bail!("fallback_table cannot be empty");
            }
        }

        if !self.restore_device && !self.restore_volume && !self.restore_muted {
            warn!("Neither restoring volume, nor restoring muted, nor restoring device enabled!");
        }

        Ok(())
    }

    pub fn options(&self) -> RestoreOptions {
        RestoreOptions {
            restore_device: self.restore_device,
            restore_volume: self.restore_volume,
            restore_muted: self.restore_muted,
            on_hotplug: self.on_hotplug,
            on_rescue: self.on_rescue,
        }
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    /// Database directory, falling back to the state directory
    pub fn database_path(&self, paths: &AppPaths) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| paths.database_path())
    }

    /// An explicitly configured table must exist; the default one may not
    pub fn seed_table(&self, paths: &AppPaths) -> SeedTable {
        match &self.fallback_table {
            Some(path) => SeedTable::Required(path.clone()),
            None => SeedTable::Optional(paths.default_seed_table()),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_save_interval_ms() -> u64 { 10_000 }
