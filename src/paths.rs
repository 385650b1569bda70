//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Portable mode**: If a `.portable` marker file exists next to the
//!   executable, the configuration and database live in the same directory.
//! - **Installed mode** (default): Configuration goes to the platform config
//!   directory and the database to the platform data directory, both under
//!   `stream-restore/`.

use std::path::PathBuf;
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "stream-restore";

const CONFIG_FILE: &str = "stream-restore.yaml";
const SEED_TABLE_FILE: &str = "stream-restore.table";

/// Application paths for config and state.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the state directory (sled database)
    pub state_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// **Debug mode**: If `stream-restore.yaml` exists in the current working
    /// directory, use that directory.
    ///
    /// **Portable mode**: If a `.portable` marker file exists next to the
    /// executable, everything is stored in that directory.
    ///
    /// **Installed mode** (default): platform config and data directories.
    ///
    /// Note: This is called before logging is initialized, so we use eprintln
    /// for early diagnostic output.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join(CONFIG_FILE);
            if cwd_config.exists() {
                eprintln!(
                    "[paths] Running in DEV mode ({} found in cwd: {})",
                    CONFIG_FILE,
                    cwd.display()
                );
                return Self {
                    config: cwd_config,
                    state_dir: cwd.join(".state"),
                    is_portable: true, // Treat dev mode like portable
                };
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self {
                config: exe_dir.join(CONFIG_FILE),
                state_dir: exe_dir.join(".state"),
                is_portable: true,
            };
        }

        // ~/.config and ~/.local/share on Linux, %APPDATA% on Windows
        let config_dir = dirs::config_dir().unwrap_or_else(|| {
            eprintln!("[paths] WARNING: dirs::config_dir() returned None, falling back to exe dir");
            exe_dir.clone()
        });
        let data_dir = dirs::data_dir().unwrap_or_else(|| {
            eprintln!("[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir");
            exe_dir.clone()
        });

        Self {
            config: config_dir.join(APP_NAME).join(CONFIG_FILE),
            state_dir: data_dir.join(APP_NAME),
            is_portable: false,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the state directory (and the config directory in installed
    /// mode) exist.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.state_dir.exists() {
            debug!("Creating state directory: {}", self.state_dir.display());
            std::fs::create_dir_all(&self.state_dir)?;
        }

        if !self.is_portable {
            let config_dir = self.base_dir();
            if !config_dir.exists() {
                debug!("Creating config directory: {}", config_dir.display());
                std::fs::create_dir_all(&config_dir)?;
            }
        }

        Ok(())
    }

    /// Get the sled database path (within state_dir)
    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("stream-volumes")
    }

    /// Seed table looked up when none is configured
    pub fn default_seed_table(&self) -> PathBuf {
        self.base_dir().join(SEED_TABLE_FILE)
    }
}
