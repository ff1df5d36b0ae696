//! Runtime settings.
//!
//! Settings are read from TOML at `~/.config/cost-audit/config.toml` (or the
//! XDG equivalent). A missing file yields the defaults. Environment variables
//! (a `.env` file is honored) override individual settings:
//!
//! | Variable                        | Setting             |
//! |---------------------------------|---------------------|
//! | `COST_AUDIT_LOG_LEVEL`          | `log_level`         |
//! | `COST_AUDIT_LOG_FORMAT`         | `log_format`        |
//! | `COST_AUDIT_CLUSTER_ID`         | `default_cluster_id`|
//! | `COST_AUDIT_COST_ALIGNMENT`     | `cost_alignment`    |
//! | `COST_AUDIT_COVERAGE_STRATEGY`  | `coverage_strategy` |
//!
//! # Example Configuration
//!
//! ```toml
//! log_level = "debug"
//! log_format = "json"
//! default_cluster_id = "prod-east"
//! cost_alignment = "timestamp"
//! coverage_strategy = "intervals"
//! dedup_log_limit = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::CoverageStrategy;
use crate::logging::{LogConfig, LogFormat};
use crate::network::CostAlignment;

pub const DEFAULT_CLUSTER_ID: &str = "cluster-one";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Used for query rows that carry no cluster id.
    pub default_cluster_id: String,
    pub cost_alignment: CostAlignment,
    pub coverage_strategy: CoverageStrategy,
    /// Times a recurring message is logged before it is suppressed.
    pub dedup_log_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            default_cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            cost_alignment: CostAlignment::default(),
            coverage_strategy: CoverageStrategy::default(),
            dedup_log_limit: 5,
        }
    }
}

impl Settings {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Default configuration file path.
    ///
    /// `$XDG_CONFIG_HOME/cost-audit/config.toml`, falling back to the
    /// platform config dir.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = dotenvy::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config)
                .join("cost-audit")
                .join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("cost-audit").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = dotenvy::var("COST_AUDIT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(format) = dotenvy::var("COST_AUDIT_LOG_FORMAT") {
            self.log_format = format.parse().map_err(ConfigError::Validation)?;
        }
        if let Ok(cluster_id) = dotenvy::var("COST_AUDIT_CLUSTER_ID") {
            self.default_cluster_id = cluster_id;
        }
        if let Ok(alignment) = dotenvy::var("COST_AUDIT_COST_ALIGNMENT") {
            self.cost_alignment = alignment.parse().map_err(ConfigError::Validation)?;
        }
        if let Ok(strategy) = dotenvy::var("COST_AUDIT_COVERAGE_STRATEGY") {
            self.coverage_strategy = strategy.parse().map_err(ConfigError::Validation)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_cluster_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_cluster_id cannot be empty".into(),
            ));
        }
        if self.dedup_log_limit == 0 {
            return Err(ConfigError::Validation(
                "dedup_log_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
