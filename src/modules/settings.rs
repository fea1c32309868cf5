//! Typed per-module settings. Payloads are opaque to the control plane but
//! each module validates its own by deserializing into these structs.

#![allow(missing_docs)]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::module_id::ModuleId;
use crate::core::errors::{HmError, Result};

/// Field every payload carries; the control plane reads it to detect profile switches.
pub const PROFILE_FIELD: &str = "Profile";

trait ModuleSettings: Serialize + DeserializeOwned + Default {
    fn profile_mut(&mut self) -> &mut String;
    fn validate(&self) -> std::result::Result<(), String>;
}

fn check_percent(name: &str, value: u8) -> std::result::Result<(), String> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within 1..=100, got {value}"))
    }
}

fn check_interval(name: &str, value: u64) -> std::result::Result<(), String> {
    if value == 0 {
        Err(format!("{name} must be positive"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LiveConfig {
    pub profile: String,
    pub ping_address: String,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub failure_threshold: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            ping_address: "8.8.8.8".to_string(),
            ping_interval_ms: 30_000,
            ping_timeout_ms: 1_000,
            failure_threshold: 3,
        }
    }
}

impl ModuleSettings for LiveConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.ping_address.trim().is_empty() {
            return Err("PingAddress must not be empty".to_string());
        }
        check_interval("PingIntervalMs", self.ping_interval_ms)?;
        check_interval("PingTimeoutMs", self.ping_timeout_ms)?;
        if self.ping_timeout_ms >= self.ping_interval_ms {
            return Err("PingTimeoutMs must be shorter than PingIntervalMs".to_string());
        }
        if self.failure_threshold == 0 {
            return Err("FailureThreshold must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TargetConfig {
    pub profile: String,
    pub check_interval_ms: u64,
    pub processes: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            check_interval_ms: 5_000,
            processes: Vec::new(),
        }
    }
}

impl ModuleSettings for TargetConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_interval("CheckIntervalMs", self.check_interval_ms)?;
        if self.processes.iter().any(|p| p.trim().is_empty()) {
            return Err("Processes must not contain empty names".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DiskConfig {
    pub profile: String,
    pub space_warning_percent: u8,
    pub inode_warning_percent: u8,
    pub recheck_interval_ms: u64,
    pub watched_dirs: Vec<String>,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            space_warning_percent: 90,
            inode_warning_percent: 90,
            recheck_interval_ms: 60_000,
            watched_dirs: vec!["/".to_string()],
        }
    }
}

impl ModuleSettings for DiskConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_percent("SpaceWarningPercent", self.space_warning_percent)?;
        check_percent("InodeWarningPercent", self.inode_warning_percent)?;
        check_interval("RecheckIntervalMs", self.recheck_interval_ms)?;
        if self.watched_dirs.is_empty() {
            return Err("WatchedDirs must name at least one directory".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RamConfig {
    pub profile: String,
    pub ram_warning_percent: u8,
    pub recheck_interval_ms: u64,
}

impl Default for RamConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            ram_warning_percent: 90,
            recheck_interval_ms: 5_000,
        }
    }
}

impl ModuleSettings for RamConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_percent("RamWarningPercent", self.ram_warning_percent)?;
        check_interval("RecheckIntervalMs", self.recheck_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CpuConfig {
    pub profile: String,
    pub cpu_warning_percent: u8,
    pub recheck_interval_ms: u64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            cpu_warning_percent: 95,
            recheck_interval_ms: 5_000,
        }
    }
}

impl ModuleSettings for CpuConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        check_percent("CpuWarningPercent", self.cpu_warning_percent)?;
        check_interval("RecheckIntervalMs", self.recheck_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NotifyConfig {
    pub profile: String,
    pub desktop: bool,
    pub email_address: String,
    pub webhook_url: String,
}

impl ModuleSettings for NotifyConfig {
    fn profile_mut(&mut self) -> &mut String {
        &mut self.profile
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.email_address.is_empty() && !self.email_address.contains('@') {
            return Err(format!("EmailAddress {:?} is not an address", self.email_address));
        }
        if !self.webhook_url.is_empty()
            && !(self.webhook_url.starts_with("http://") || self.webhook_url.starts_with("https://"))
        {
            return Err("WebhookUrl must be an http(s) URL".to_string());
        }
        Ok(())
    }
}

fn defaults_for<S: ModuleSettings>(profile: &str) -> Value {
    let mut settings = S::default();
    profile.clone_into(settings.profile_mut());
    serde_json::to_value(settings).unwrap_or(Value::Null)
}

fn normalize_as<S: ModuleSettings>(id: ModuleId, raw: &Value, profile: &str) -> Result<Value> {
    let mut settings: S =
        serde_json::from_value(raw.clone()).map_err(|e| HmError::InvalidModuleConfig {
            module: id.as_str(),
            details: e.to_string(),
        })?;
    settings
        .validate()
        .map_err(|details| HmError::InvalidModuleConfig {
            module: id.as_str(),
            details,
        })?;
    profile.clone_into(settings.profile_mut());
    Ok(serde_json::to_value(settings)?)
}

/// Default settings for `id`, stamped with `profile`.
#[must_use]
pub fn default_config(id: ModuleId, profile: &str) -> Value {
    match id {
        ModuleId::Live => defaults_for::<LiveConfig>(profile),
        ModuleId::Target => defaults_for::<TargetConfig>(profile),
        ModuleId::Disk => defaults_for::<DiskConfig>(profile),
        ModuleId::Ram => defaults_for::<RamConfig>(profile),
        ModuleId::Cpu => defaults_for::<CpuConfig>(profile),
        ModuleId::Notify => defaults_for::<NotifyConfig>(profile),
    }
}

/// Validate `raw` as settings for `id` and return the canonical form stamped
/// with `profile`. Unknown fields are dropped, missing ones take defaults.
pub fn normalize(id: ModuleId, raw: &Value, profile: &str) -> Result<Value> {
    match id {
        ModuleId::Live => normalize_as::<LiveConfig>(id, raw, profile),
        ModuleId::Target => normalize_as::<TargetConfig>(id, raw, profile),
        ModuleId::Disk => normalize_as::<DiskConfig>(id, raw, profile),
        ModuleId::Ram => normalize_as::<RamConfig>(id, raw, profile),
        ModuleId::Cpu => normalize_as::<CpuConfig>(id, raw, profile),
        ModuleId::Notify => normalize_as::<NotifyConfig>(id, raw, profile),
    }
}

/// Read the `Profile` field of a raw payload. Missing, non-string, or
/// unparseable payloads yield an empty string.
#[must_use]
pub fn profile_of(data: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ProfileOnly {
        #[serde(rename = "Profile", default)]
        profile: Option<Value>,
    }
    serde_json::from_slice::<ProfileOnly>(data)
        .ok()
        .and_then(|p| p.profile)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
