//! SQLite activity table, sharing the module store's database file.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, params};

use super::{ActivityEvent, ActivityLogger, ActivityRecord, ActivitySink};
use crate::core::errors::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activity_log (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    ts      TEXT NOT NULL,
    event   TEXT NOT NULL,
    payload TEXT NOT NULL
);
";

#[derive(Debug)]
pub struct SqliteLogger {
    conn: Mutex<Connection>,
}

impl SqliteLogger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT payload FROM activity_log ORDER BY id DESC LIMIT ?1")?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            out.push(serde_json::from_str(&payload?)?);
        }
        Ok(out)
    }
}

fn event_name(event: &ActivityEvent) -> &'static str {
    match event {
        ActivityEvent::SignalSent { .. } => "signal_sent",
        ActivityEvent::SignalApplied { .. } => "signal_applied",
        ActivityEvent::ModuleToggled { .. } => "module_toggled",
        ActivityEvent::ConfigSaved { .. } => "config_saved",
        ActivityEvent::ProfileSwitched { .. } => "profile_switched",
        ActivityEvent::ProfileLoaded { .. } => "profile_loaded",
        ActivityEvent::CascadeFailed { .. } => "cascade_failed",
        ActivityEvent::SchedulerStarted => "scheduler_started",
        ActivityEvent::SchedulerStopped => "scheduler_stopped",
        ActivityEvent::Error { .. } => "error",
    }
}

impl ActivitySink for SqliteLogger {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&self, record: &ActivityRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.conn.lock().execute(
            "INSERT INTO activity_log (ts, event, payload) VALUES (?1, ?2, ?3)",
            params![record.ts.to_rfc3339(), event_name(&record.event), payload],
        )?;
        Ok(())
    }
}

impl ActivityLogger for SqliteLogger {
    fn log(&self, event: ActivityEvent) {
        if let Err(err) = self.write(&ActivityRecord::now(event)) {
            eprintln!("[hmon] activity log insert failed: {err}");
        }
    }
}
