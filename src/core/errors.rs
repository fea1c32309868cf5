//! HM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HmError>;

/// Top-level error type for the health monitor.
#[derive(Debug, Error)]
pub enum HmError {
    #[error("[HM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[HM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[HM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[HM-2001] module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("[HM-2002] module {module} registered twice")]
    DuplicateModule { module: &'static str },

    #[error("[HM-2101] profile {name:?} not found, allowed profiles {available:?}")]
    ProfileNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("[HM-2102] invalid profile name {name:?}")]
    InvalidProfileName { name: String },

    #[error("[HM-2103] invalid config for module {module}: {details}")]
    InvalidModuleConfig {
        module: &'static str,
        details: String,
    },

    #[error("[HM-2201] cascade to profile {profile:?} failed at module {module}: {details}")]
    CascadeFailure {
        module: &'static str,
        profile: String,
        details: String,
    },

    #[error("[HM-2202] cascade to profile {profile:?} timed out at module {module} after {timeout:?}")]
    CascadeTimeout {
        module: &'static str,
        profile: String,
        timeout: Duration,
    },

    #[error("[HM-2301] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[HM-2302] persistence failure in {context}: {details}")]
    Persistence {
        context: &'static str,
        details: String,
    },

    #[error("[HM-3001] signal queue full after waiting {waited:?}")]
    SignalQueueFull { waited: Duration },

    #[error("[HM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[HM-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[HM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl HmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "HM-1001",
            Self::MissingConfig { .. } => "HM-1002",
            Self::ConfigParse { .. } => "HM-1003",
            Self::ModuleNotFound { .. } => "HM-2001",
            Self::DuplicateModule { .. } => "HM-2002",
            Self::ProfileNotFound { .. } => "HM-2101",
            Self::InvalidProfileName { .. } => "HM-2102",
            Self::InvalidModuleConfig { .. } => "HM-2103",
            Self::CascadeFailure { .. } => "HM-2201",
            Self::CascadeTimeout { .. } => "HM-2202",
            Self::Serialization { .. } => "HM-2301",
            Self::Persistence { .. } => "HM-2302",
            Self::SignalQueueFull { .. } => "HM-3001",
            Self::Io { .. } => "HM-3002",
            Self::ChannelClosed { .. } => "HM-3003",
            Self::Runtime { .. } => "HM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::SignalQueueFull { .. }
                | Self::Persistence { .. }
                | Self::CascadeTimeout { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the caller sent something unknown (maps to "not found" at the transport edge).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. } | Self::ProfileNotFound { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for HmError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for HmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
