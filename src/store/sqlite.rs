//! SQLite-backed store. A fresh database is seeded with every module's
//! defaults under the `default` profile.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::ConfigStore;
use crate::control::module_id::ModuleId;
use crate::control::profile::ProfilePhase;
use crate::control::state::{DEFAULT_PROFILE, DesiredState, ModuleFlags};
use crate::core::errors::{HmError, Result};
use crate::modules::settings;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS module_config (
    module     TEXT NOT NULL,
    profile    TEXT NOT NULL,
    config     TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (module, profile)
);
CREATE TABLE IF NOT EXISTS module_state (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    live    INTEGER NOT NULL,
    target  INTEGER NOT NULL,
    disk    INTEGER NOT NULL,
    ram     INTEGER NOT NULL,
    cpu     INTEGER NOT NULL,
    profile TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS profile_phase (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    phase      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Debug)]
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create and seed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HmError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(Duration::from_secs(2))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            path,
            conn: Mutex::new(conn),
        };
        store.seed_if_empty()?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn seed_if_empty(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM module_config", [], |row| row.get(0))?;
        if rows > 0 {
            return Ok(());
        }
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for id in ModuleId::ALL {
            let config = settings::default_config(id, DEFAULT_PROFILE);
            tx.execute(
                "INSERT INTO module_config (module, profile, config, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), DEFAULT_PROFILE, config.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl ConfigStore for SqliteStore {
    fn list_profiles(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT profile FROM module_config ORDER BY profile")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for profile in rows {
            out.push(profile?);
        }
        Ok(out)
    }

    fn load_module_config(&self, module: ModuleId, profile: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT config FROM module_config WHERE module = ?1 AND profile = ?2",
                params![module.as_str(), profile],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(HmError::from))
            .transpose()
    }

    fn save_module_config(&self, module: ModuleId, profile: &str, config: &Value) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO module_config (module, profile, config, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(module, profile) DO UPDATE SET config = excluded.config, updated_at = excluded.updated_at",
            params![
                module.as_str(),
                profile,
                config.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn load_desired_state(&self) -> Result<Option<DesiredState>> {
        let state = self
            .conn
            .lock()
            .query_row(
                "SELECT live, target, disk, ram, cpu, profile FROM module_state WHERE id = 1",
                [],
                |row| {
                    Ok(DesiredState {
                        modules: ModuleFlags {
                            live: row.get(0)?,
                            target: row.get(1)?,
                            disk: row.get(2)?,
                            ram: row.get(3)?,
                            cpu: row.get(4)?,
                        },
                        profile: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn save_desired_state(&self, state: &DesiredState) -> Result<()> {
        let m = &state.modules;
        self.conn.lock().execute(
            "INSERT INTO module_state (id, live, target, disk, ram, cpu, profile) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET live = excluded.live, target = excluded.target,
                 disk = excluded.disk, ram = excluded.ram, cpu = excluded.cpu, profile = excluded.profile",
            params![m.live, m.target, m.disk, m.ram, m.cpu, state.profile],
        )?;
        Ok(())
    }

    fn load_profile_phase(&self) -> Result<Option<ProfilePhase>> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT phase FROM profile_phase WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(HmError::from))
            .transpose()
    }

    fn save_profile_phase(&self, phase: &ProfilePhase) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO profile_phase (id, phase, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET phase = excluded.phase, updated_at = excluded.updated_at",
            params![serde_json::to_string(phase)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
