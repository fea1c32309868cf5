//! Status snapshot shared between a module's worker and its capability.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::control::module_id::ModuleId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleStatus {
    pub module: ModuleId,
    pub running: bool,
    pub profile: String,
    pub ticks: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_tick: Option<DateTime<Utc>>,
    /// Module-specific readings, written by the worker.
    pub detail: Value,
}

#[derive(Debug)]
pub struct StatusBoard {
    inner: RwLock<ModuleStatus>,
}

impl StatusBoard {
    #[must_use]
    pub fn new(module: ModuleId) -> Self {
        Self {
            inner: RwLock::new(ModuleStatus {
                module,
                running: false,
                profile: String::new(),
                ticks: 0,
                started_at: None,
                last_tick: None,
                detail: Value::Null,
            }),
        }
    }

    pub fn mark_started(&self, profile: &str) {
        let mut status = self.inner.write();
        status.running = true;
        profile.clone_into(&mut status.profile);
        status.ticks = 0;
        status.started_at = Some(Utc::now());
        status.last_tick = None;
    }

    pub fn mark_stopped(&self) {
        self.inner.write().running = false;
    }

    pub fn record_tick(&self, detail: Option<Value>) {
        let mut status = self.inner.write();
        status.ticks += 1;
        status.last_tick = Some(Utc::now());
        if let Some(detail) = detail {
            status.detail = detail;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ModuleStatus {
        self.inner.read().clone()
    }
}
