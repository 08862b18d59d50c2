//! Path management for Stratum's file system footprint.
//!
//! This module provides centralized path management for the controller's
//! on-disk state, keeping a clean, predictable folder structure under the
//! user's home directory.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Central path manager for Stratum's file system organization.
#[derive(Debug, Clone)]
pub struct StratumPaths {
    /// Stratum home directory (e.g., ~/.stratum)
    pub home_dir: PathBuf,
    /// Logs directory for all log files
    pub logs_dir: PathBuf,
    /// Config directory for configuration files
    pub config_dir: PathBuf,
}

impl StratumPaths {
    /// Create a new path manager and ensure all directories exist.
    pub fn new() -> Result<Self> {
        let home_dir = Self::get_stratum_home()?;

        let paths = Self {
            logs_dir: home_dir.join("logs"),
            config_dir: home_dir.join("config"),
            home_dir,
        };

        paths.ensure_directories_exist()?;

        Ok(paths)
    }

    fn get_stratum_home() -> Result<PathBuf> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Ok(home.join(".stratum"))
    }

    fn ensure_directories_exist(&self) -> Result<()> {
        for dir in [&self.home_dir, &self.logs_dir, &self.config_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Get a log file path with timestamp.
    pub fn log_file(&self, name: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        self.logs_dir.join(format!("{}-{}.log", name, timestamp))
    }

    /// Get the config file path for a given name.
    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.toml", name))
    }

    /// Get the default config file path.
    pub fn default_config_file(&self) -> PathBuf {
        self.config_file("stratum")
    }

    /// Get a relative path from the home directory.
    #[allow(dead_code)]
    pub fn relative_to_home(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.home_dir).ok().map(|p| p.to_path_buf())
    }
}

impl Default for StratumPaths {
    fn default() -> Self {
        Self::new().expect("failed to create Stratum paths")
    }
}

/// Get the global Stratum paths instance.
pub fn get_stratum_paths() -> Result<StratumPaths> {
    StratumPaths::new()
}
