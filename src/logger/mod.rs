//! Dual-write activity logging: JSONL append-only + SQLite, with graceful degradation.

pub mod dual;
pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::control::module_id::ModuleId;
use crate::control::signal::Signal;
use crate::core::errors::Result;

/// Something the control plane or scheduler did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActivityEvent {
    SignalSent {
        signal: Signal,
    },
    SignalApplied {
        module: ModuleId,
        running: bool,
    },
    ModuleToggled {
        module: ModuleId,
        enabled: bool,
    },
    ConfigSaved {
        module: ModuleId,
        profile: String,
    },
    ProfileSwitched {
        from: String,
        to: String,
    },
    ProfileLoaded {
        profile: String,
    },
    /// A switch stopped midway; `switched` already hold `to`, the rest hold `from`.
    CascadeFailed {
        from: String,
        to: String,
        switched: Vec<ModuleId>,
        failed: ModuleId,
        error: String,
    },
    SchedulerStarted,
    SchedulerStopped,
    Error {
        context: String,
        details: String,
    },
}

/// Timestamped event as written to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ActivityEvent,
}

impl ActivityRecord {
    #[must_use]
    pub fn now(event: ActivityEvent) -> Self {
        Self {
            ts: Utc::now(),
            event,
        }
    }
}

/// Fire-and-forget logging entry point. Never fails the caller.
pub trait ActivityLogger: Send + Sync {
    fn log(&self, event: ActivityEvent);
}

/// A fallible destination for records.
pub trait ActivitySink: Send + Sync {
    fn name(&self) -> &'static str;
    fn write(&self, record: &ActivityRecord) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl ActivityLogger for NullLogger {
    fn log(&self, _event: ActivityEvent) {}
}

/// Keeps events in memory, for hosts that surface them on their own.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemoryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().clone()
    }
}

impl ActivityLogger for MemoryLogger {
    fn log(&self, event: ActivityEvent) {
        self.events.lock().push(event);
    }
}
