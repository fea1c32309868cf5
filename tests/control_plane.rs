//! End-to-end control-plane behavior through the public API.

use std::sync::Arc;
use std::time::Duration;

use health_monitor::control::module_id::ModuleId;
use health_monitor::control::plane::ControlPlane;
use health_monitor::control::profile::ProfilePhase;
use health_monitor::control::registry::{FnModule, ModuleRegistry};
use health_monitor::control::signal::{Signal, SignalReceiver, signal_bus};
use health_monitor::control::state::{DesiredState, StandaloneState};
use health_monitor::core::errors::HmError;
use health_monitor::logger::{ActivityEvent, MemoryLogger};
use health_monitor::modules::BuiltinModules;
use health_monitor::store::{ConfigStore, MemoryStore};
use parking_lot::Mutex;
use proptest::prelude::*;

type Calls = Arc<Mutex<Vec<(ModuleId, Option<String>, String)>>>;

struct Harness {
    plane: ControlPlane,
    rx: SignalReceiver,
    calls: Calls,
    logger: Arc<MemoryLogger>,
}

/// Plane over recording modules; `fail` makes one module refuse one profile.
fn recording_plane(ids: &[ModuleId], fail: Option<(ModuleId, &'static str)>) -> Harness {
    let calls = Calls::default();
    let mut builder = ModuleRegistry::builder();
    for &id in ids {
        let calls = Arc::clone(&calls);
        let refuse = fail.and_then(|(m, p)| (m == id).then_some(p));
        let module = FnModule::new(
            move || format!(r#"{{"Module":"{id}"}}"#).into_bytes(),
            || br#"{"Profile":"p1"}"#.to_vec(),
            move |data, profile| {
                let data = data.map(|d| String::from_utf8_lossy(d).into_owned());
                calls.lock().push((id, data, profile.to_string()));
                if refuse == Some(profile) {
                    return Err(HmError::Persistence {
                        context: "module store",
                        details: format!("no {profile} row for {id}"),
                    });
                }
                Ok(())
            },
        );
        builder = builder.register(id, Arc::new(module)).unwrap();
    }
    let store = Arc::new(MemoryStore::seeded());
    let state = Arc::new(StandaloneState::new(DesiredState {
        profile: "p1".to_string(),
        ..DesiredState::default()
    }));
    let (tx, rx) = signal_bus(32, Duration::from_millis(50));
    let logger = Arc::new(MemoryLogger::new());
    let plane = ControlPlane::new(builder.build(), state, store, tx, Duration::from_secs(1))
        .with_logger(logger.clone());
    Harness {
        plane,
        rx,
        calls,
        logger,
    }
}

const ABC: [ModuleId; 3] = [ModuleId::Live, ModuleId::Disk, ModuleId::Ram];

#[test]
fn unregistered_lookup_is_not_found() {
    let h = recording_plane(&ABC, None);
    for name in ["cpu", "target", "CPU", "", "disk "] {
        let err = h.plane.get_config_json(name).unwrap_err();
        assert!(matches!(err, HmError::ModuleNotFound { .. }), "{name}: {err}");
    }
    assert!(h.calls.lock().is_empty());
}

#[test]
fn resolve_returns_registered_descriptor() {
    let h = recording_plane(&ABC, None);
    for id in ABC {
        let status = h.plane.get_status_json(id.as_str()).unwrap();
        assert_eq!(status, format!(r#"{{"Module":"{id}"}}"#).into_bytes());
    }
}

#[test]
fn same_profile_save_does_not_touch_other_modules() {
    let h = recording_plane(&ABC, None);
    h.plane
        .save_config("live", br#"{"Profile":"p1","PingAddress":"1.1.1.1"}"#)
        .unwrap();
    let calls = h.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ModuleId::Live);
    assert_eq!(h.rx.drain(8), vec![Signal::stop(ModuleId::Live)]);
}

#[test]
fn switch_cascades_with_null_data_and_updates_active_profile() {
    let h = recording_plane(&ABC, None);
    h.plane.save_config("live", br#"{"Profile":"p2"}"#).unwrap();

    let calls = h.calls.lock().clone();
    assert_eq!(calls[0], (ModuleId::Live, Some(r#"{"Profile":"p2"}"#.to_string()), "p2".to_string()));
    let cascaded: Vec<_> = calls[1..]
        .iter()
        .filter(|(_, data, profile)| data.is_none() && profile == "p2")
        .map(|(id, _, _)| *id)
        .collect();
    assert_eq!(cascaded, vec![ModuleId::Disk, ModuleId::Ram]);
    assert_eq!(h.plane.active_profile(), "p2");
    assert!(h.plane.profile_status().is_consistent());
    assert!(h.logger.events().contains(&ActivityEvent::ProfileSwitched {
        from: "p1".to_string(),
        to: "p2".to_string(),
    }));
}

#[test]
fn cascade_failure_keeps_old_profile_and_flags_inconsistency() {
    let h = recording_plane(&ABC, Some((ModuleId::Disk, "p2")));
    let err = h.plane.save_config("live", br#"{"Profile":"p2"}"#).unwrap_err();
    assert!(matches!(err, HmError::CascadeFailure { module: "disk", .. }), "{err}");
    assert_eq!(h.plane.active_profile(), "p1");

    let status = h.plane.profile_status();
    assert!(!status.is_consistent());
    assert!(matches!(
        status.phase,
        ProfilePhase::Inconsistent { failed: ModuleId::Disk, .. }
    ));
    // ram was never reached
    assert!(h
        .calls
        .lock()
        .iter()
        .all(|(id, _, profile)| !(*id == ModuleId::Ram && profile == "p2")));
}

#[test]
fn load_unknown_profile_reports_available_and_keeps_state() {
    let h = recording_plane(&ABC, None);
    let before = h.plane.desired_state();
    let err = h.plane.load_profile("nonexistent").unwrap_err();
    match err {
        HmError::ProfileNotFound { name, available } => {
            assert_eq!(name, "nonexistent");
            assert_eq!(available, vec!["default".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.plane.desired_state(), before);
    assert!(h.rx.drain(8).is_empty());
}

#[test]
fn concurrent_switches_leave_one_consistent_profile() {
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::seeded());
    let (registry, _) = BuiltinModules::build(&store, &ModuleId::ALL, "default")
        .unwrap()
        .into_parts();
    let state = Arc::new(StandaloneState::new(DesiredState::default()));
    let (tx, rx) = signal_bus(64, Duration::from_millis(200));
    let plane = Arc::new(ControlPlane::new(
        registry,
        state,
        Arc::clone(&store),
        tx,
        Duration::from_secs(2),
    ));

    let handles: Vec<_> = ["alpha", "beta", "gamma", "delta"]
        .into_iter()
        .map(|profile| {
            let plane = Arc::clone(&plane);
            std::thread::spawn(move || {
                let body = format!(r#"{{"Profile":"{profile}"}}"#);
                plane.save_config("cpu", body.as_bytes())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let active = plane.active_profile();
    assert!(plane.profile_status().is_consistent());
    for id in ModuleId::ALL {
        let config: serde_json::Value =
            serde_json::from_slice(&plane.get_config_json(id.as_str()).unwrap()).unwrap();
        assert_eq!(config["Profile"], active.as_str(), "{id} disagrees");
    }
    assert_eq!(rx.drain(64).len(), 8, "stop plus restart_all per switch");
}

proptest! {
    #[test]
    fn enabling_is_idempotent_but_always_signals(
        name in prop::sample::select(vec!["live", "target", "disk", "inode", "ram", "cpu"]),
        enabled in any::<bool>(),
        repeats in 1usize..5,
    ) {
        let h = recording_plane(&ModuleId::ALL, None);
        h.plane.set_module_enabled(name, enabled).unwrap();
        let once = h.plane.desired_state();
        for _ in 1..repeats {
            h.plane.set_module_enabled(name, enabled).unwrap();
        }
        prop_assert_eq!(h.plane.desired_state(), once);
        prop_assert_eq!(h.rx.drain(16).len(), repeats);
    }

    #[test]
    fn inode_and_disk_always_agree(enabled in any::<bool>()) {
        let h = recording_plane(&ModuleId::ALL, None);
        h.plane.set_module_enabled("inode", enabled).unwrap();
        prop_assert_eq!(
            h.plane.get_status_json("inode").unwrap(),
            h.plane.get_status_json("disk").unwrap()
        );
        prop_assert_eq!(h.plane.desired_state().modules.disk, enabled);
    }
}
