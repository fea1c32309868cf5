//! Durable state across process restarts, using on-disk SQLite stores.

use std::sync::Arc;
use std::time::Duration;

use health_monitor::control::module_id::ModuleId;
use health_monitor::control::profile::ProfilePhase;
use health_monitor::control::state::DesiredState;
use health_monitor::control::signal::Signal;
use health_monitor::core::config::{Config, PathsConfig};
use health_monitor::core::errors::{HmError, Result};
use health_monitor::daemon::{Scheduler, SchedulerTiming};
use health_monitor::logger::{ActivityRecord, NullLogger};
use health_monitor::runtime::Runtime;
use health_monitor::store::{ConfigStore, SqliteStore};
use tempfile::TempDir;

fn config_in(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths = PathsConfig::under(&tmp.path().join("hm"));
    config.control.cascade_timeout_ms = 2_000;
    config.modules.tick_interval_ms = 20;
    config
}

fn config_value(runtime: &Runtime, module: &str) -> serde_json::Value {
    serde_json::from_slice(&runtime.plane.get_config_json(module).unwrap()).unwrap()
}

#[test]
fn profile_switch_survives_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let runtime = Runtime::open(config_in(&tmp)).unwrap();
        runtime
            .plane
            .save_config("ram", br#"{"Profile":"night","RamWarningPercent":70}"#)
            .unwrap();
        runtime.plane.set_module_enabled("cpu", false).unwrap();
    }

    let runtime = Runtime::open(config_in(&tmp)).unwrap();
    assert_eq!(runtime.plane.active_profile(), "night");
    assert!(!runtime.plane.desired_state().modules.cpu);
    assert_eq!(config_value(&runtime, "ram")["RamWarningPercent"], 70);
    assert_eq!(config_value(&runtime, "inode")["Profile"], "night");
    assert_eq!(
        runtime.plane.list_profiles().unwrap(),
        vec!["default".to_string(), "night".to_string()]
    );
}

/// SQLite store that refuses writes to one (module, profile) row.
struct ReadOnlyRow {
    inner: SqliteStore,
    module: ModuleId,
    profile: &'static str,
}

impl ConfigStore for ReadOnlyRow {
    fn list_profiles(&self) -> Result<Vec<String>> {
        self.inner.list_profiles()
    }

    fn load_module_config(
        &self,
        module: ModuleId,
        profile: &str,
    ) -> Result<Option<serde_json::Value>> {
        self.inner.load_module_config(module, profile)
    }

    fn save_module_config(
        &self,
        module: ModuleId,
        profile: &str,
        config: &serde_json::Value,
    ) -> Result<()> {
        if module == self.module && profile == self.profile {
            return Err(HmError::Persistence {
                context: "module_config",
                details: format!("{module}/{profile} is read-only"),
            });
        }
        self.inner.save_module_config(module, profile, config)
    }

    fn load_desired_state(&self) -> Result<Option<DesiredState>> {
        self.inner.load_desired_state()
    }

    fn save_desired_state(&self, state: &DesiredState) -> Result<()> {
        self.inner.save_desired_state(state)
    }

    fn load_profile_phase(&self) -> Result<Option<ProfilePhase>> {
        self.inner.load_profile_phase()
    }

    fn save_profile_phase(&self, phase: &ProfilePhase) -> Result<()> {
        self.inner.save_profile_phase(phase)
    }
}

#[test]
fn failed_switch_is_reported_by_a_later_process() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    {
        let store = ReadOnlyRow {
            inner: SqliteStore::open(&config.paths.db_file).unwrap(),
            module: ModuleId::Ram,
            profile: "night",
        };
        let runtime =
            Runtime::with_store(config.clone(), Arc::new(store), Arc::new(NullLogger)).unwrap();
        let err = runtime
            .plane
            .save_config("cpu", br#"{"Profile":"night"}"#)
            .unwrap_err();
        assert!(matches!(err, HmError::CascadeFailure { module: "ram", .. }), "{err}");
        assert!(!runtime.plane.profile_status().is_consistent());
    }

    let runtime = Runtime::open(config.clone()).unwrap();
    let status = runtime.plane.profile_status();
    assert_eq!(status.active, "default");
    match status.phase {
        ProfilePhase::Inconsistent {
            to,
            switched,
            failed,
            ..
        } => {
            assert_eq!(to, "night");
            assert_eq!(failed, ModuleId::Ram);
            assert!(switched.contains(&ModuleId::Cpu));
        }
        other => panic!("expected inconsistent phase, got {other:?}"),
    }

    runtime.plane.load_profile("default").unwrap();
    drop(runtime);
    let runtime = Runtime::open(config).unwrap();
    assert!(runtime.plane.profile_status().is_consistent());
}

#[test]
fn load_profile_restores_stored_values() {
    let tmp = TempDir::new().unwrap();
    let runtime = Runtime::open(config_in(&tmp)).unwrap();
    runtime
        .plane
        .save_config("cpu", br#"{"Profile":"night","CpuWarningPercent":60}"#)
        .unwrap();
    runtime.plane.load_profile("default").unwrap();
    assert_eq!(runtime.plane.active_profile(), "default");
    let signals = runtime.signals.drain(16);
    assert_eq!(signals.last(), Some(&Signal::restart_all()));

    let store = SqliteStore::open(&runtime.config.paths.db_file).unwrap();
    let night = store
        .load_module_config(ModuleId::Cpu, "night")
        .unwrap()
        .unwrap();
    assert_eq!(night["CpuWarningPercent"], 60);
    assert_eq!(store.load_desired_state().unwrap().unwrap().profile, "default");
}

#[test]
fn activity_is_written_to_jsonl_and_sqlite() {
    let tmp = TempDir::new().unwrap();
    let runtime = Runtime::open(config_in(&tmp)).unwrap();
    runtime.plane.set_module_enabled("live", false).unwrap();
    runtime.plane.save_config("disk", br#"{"Profile":"default"}"#).unwrap();

    let raw = std::fs::read_to_string(&runtime.config.paths.activity_log).unwrap();
    let records: Vec<ActivityRecord> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(records.len() >= 3, "toggle, signal, save: {records:?}");
    assert!(raw.contains(r#""event":"module_toggled""#));
    assert!(raw.contains(r#""event":"config_saved""#));

    let sqlite = health_monitor::logger::sqlite::SqliteLogger::open(&runtime.config.paths.db_file)
        .unwrap();
    assert!(!sqlite.recent(10).unwrap().is_empty());
}

#[test]
fn scheduler_runs_desired_modules_from_disk_state() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    {
        let runtime = Runtime::open(config.clone()).unwrap();
        runtime.plane.set_module_enabled("ram", false).unwrap();
    }

    let runtime = Runtime::open(config).unwrap();
    let actual = runtime.actual_writer().unwrap();
    let mut scheduler = Scheduler::new(
        Arc::clone(&runtime.plane),
        Arc::clone(&runtime.store),
        actual,
        runtime.boards.clone(),
        Arc::clone(&runtime.watch),
        Arc::clone(&runtime.logger),
        SchedulerTiming::with_tick(Duration::from_millis(10)),
    );
    scheduler.start_desired().unwrap();
    assert!(runtime.plane.is_module_running("cpu"));
    assert!(!runtime.plane.is_module_running("ram"));
    assert!(runtime.plane.can_serve("main"));

    std::thread::sleep(Duration::from_millis(50));
    let status: serde_json::Value =
        serde_json::from_slice(&runtime.plane.get_status_json("cpu").unwrap()).unwrap();
    assert!(status["Ticks"].as_u64().unwrap() >= 1);

    runtime.plane.set_module_enabled("ram", true).unwrap();
    for signal in runtime.signals.drain(16) {
        scheduler.apply(signal).unwrap();
    }
    assert!(runtime.plane.is_module_running("ram"));
    scheduler.shutdown();
    assert!(!runtime.plane.is_module_running("cpu"));
}
