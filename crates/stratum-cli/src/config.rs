//! Configuration management for the Stratum CLI.
//!
//! Settings are loaded from an optional TOML file, then overridden by
//! command-line flags. Nothing here affects the protocol itself — only the
//! server's ambient behavior (logging, and how long audit trails are kept).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Flow-registry retention settings.
    pub flows: FlowsConfig,

    /// Registration metadata used by `setup` when writing the agent
    /// instruction block.
    pub server: ServerConfig,
}

/// Logging configuration. Stratum never logs to stdout/stderr in server
/// mode, since stdout is the protocol transport — only the file path and
/// level are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter, e.g. "info", "debug".
    pub level: String,

    /// Optional explicit log file path; defaults to `StratumPaths::log_file`.
    pub file: Option<PathBuf>,
}

/// Bounds on how many completed/failed flows the registry retains.
///
/// The protocol spec leaves an explicit bound unspecified (§5: "implementers
/// may add LRU with a generous bound"); `max_retained_flows = 0` means
/// unbounded, matching the spec's default of keeping every flow for the
/// process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsConfig {
    pub max_retained_flows: u32,
}

/// Metadata the `setup` subcommand writes into the project's MCP server
/// registration and agent-instruction block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            max_retained_flows: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "stratum".to_string(),
            command: "stratum".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file, falling back to defaults if it does
    /// not exist.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge with another configuration; fields set on `other` take
    /// precedence over `self`.
    pub fn merge(&mut self, other: &Config) {
        if other.logging.level != "info" {
            self.logging.level = other.logging.level.clone();
        }
        if other.logging.file.is_some() {
            self.logging.file = other.logging.file.clone();
        }
        if other.flows.max_retained_flows != 0 {
            self.flows.max_retained_flows = other.flows.max_retained_flows;
        }
    }

    /// Default configuration file path, under the OS config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| ".".into()))
            .join("stratum")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_has_info_level_and_unbounded_retention() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.flows.max_retained_flows, 0);
    }

    #[test]
    fn config_round_trips_through_toml() -> Result<()> {
        let config = Config::default();
        let toml_str = toml::to_string(&config)?;
        let parsed: Config = toml::from_str(&toml_str)?;
        assert_eq!(config.logging.level, parsed.logging.level);
        Ok(())
    }

    #[test]
    fn config_file_round_trips() -> Result<()> {
        let config = Config::default();
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;
        assert_eq!(config.server.name, loaded.server.name);

        Ok(())
    }

    #[test]
    fn missing_config_file_yields_defaults() -> Result<()> {
        let loaded = Config::load_from_file(std::path::Path::new("/nonexistent/stratum.toml"))?;
        assert_eq!(loaded.logging.level, "info");
        Ok(())
    }

    #[test]
    fn merge_prefers_overridden_fields() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.logging.level = "debug".to_string();
        other.flows.max_retained_flows = 500;

        base.merge(&other);

        assert_eq!(base.logging.level, "debug");
        assert_eq!(base.flows.max_retained_flows, 500);
    }
}
