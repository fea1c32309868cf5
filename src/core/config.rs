//! Daemon configuration: TOML file with serde defaults plus environment overrides.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::module_id::ModuleId;
use crate::core::errors::{HmError, Result};

/// Environment variable pointing at an alternative config file.
pub const ENV_CONFIG: &str = "HMON_CONFIG";
/// Environment variable overriding `paths.home_dir`.
pub const ENV_HOME: &str = "HMON_HOME";
/// Environment variable overriding `paths.db_file`.
pub const ENV_DB: &str = "HMON_DB";

const HOME_DIR_NAME: &str = ".health_monitor";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub control: ControlConfig,
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub home_dir: PathBuf,
    pub config_file: PathBuf,
    pub db_file: PathBuf,
    pub activity_log: PathBuf,
    /// Status snapshots the daemon publishes for other processes.
    pub status_file: PathBuf,
}

impl PathsConfig {
    /// Derive every path from a single home directory.
    #[must_use]
    pub fn under(home_dir: &Path) -> Self {
        Self {
            home_dir: home_dir.to_path_buf(),
            config_file: home_dir.join("config.toml"),
            db_file: home_dir.join("health_monitor.db"),
            activity_log: home_dir.join("activity.jsonl"),
            status_file: home_dir.join("status.json"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        Self::under(&base.join(HOME_DIR_NAME))
    }
}

/// How desired and actual module state relate in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Desired and actual state are separate records reconciled through Signals.
    #[default]
    Standalone,
    /// A host process owns the workers; desired and actual share one record.
    Embedded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub deployment: Deployment,
    pub signal_queue_capacity: usize,
    pub signal_send_timeout_ms: u64,
    pub cascade_timeout_ms: u64,
}

impl ControlConfig {
    #[must_use]
    pub const fn signal_send_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_send_timeout_ms)
    }

    #[must_use]
    pub const fn cascade_timeout(&self) -> Duration {
        Duration::from_millis(self.cascade_timeout_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            deployment: Deployment::Standalone,
            signal_queue_capacity: 32,
            signal_send_timeout_ms: 5_000,
            cascade_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Modules registered in this deployment.
    pub enabled: Vec<ModuleId>,
    /// Worker tick period.
    pub tick_interval_ms: u64,
}

impl ModulesConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: ModuleId::ALL.to_vec(),
            tick_interval_ms: 1_000,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `HMON_CONFIG`, or from the default
    /// location. A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(HmError::MissingConfig { path });
                }
                let mut config = Self::from_file(&path)?;
                config.paths.config_file = path;
                config
            }
            None => {
                let defaults = Self::default();
                if defaults.paths.config_file.is_file() {
                    Self::from_file(&defaults.paths.config_file)?
                } else {
                    defaults
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| HmError::io(path, e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HmError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(home) = std::env::var_os(ENV_HOME) {
            let config_file = self.paths.config_file.clone();
            self.paths = PathsConfig::under(Path::new(&home));
            self.paths.config_file = config_file;
        }
        if let Some(db) = std::env::var_os(ENV_DB) {
            self.paths.db_file = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.control.signal_queue_capacity == 0 {
            return Err(HmError::InvalidConfig {
                details: "control.signal_queue_capacity must be at least 1".to_string(),
            });
        }
        if self.control.signal_send_timeout_ms == 0 {
            return Err(HmError::InvalidConfig {
                details: "control.signal_send_timeout_ms must be positive".to_string(),
            });
        }
        if self.control.cascade_timeout_ms == 0 {
            return Err(HmError::InvalidConfig {
                details: "control.cascade_timeout_ms must be positive".to_string(),
            });
        }
        if self.modules.tick_interval_ms == 0 {
            return Err(HmError::InvalidConfig {
                details: "modules.tick_interval_ms must be positive".to_string(),
            });
        }
        Ok(())
    }
}
