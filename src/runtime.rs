//! Process assembly: store, modules, state tracker, signal bus, and control
//! plane wired together from a [`Config`].

use std::sync::Arc;

use crate::control::hooks::{TARGET_PROCESS, WatchList, WatchListHook};
use crate::control::plane::ControlPlane;
use crate::control::signal::{SignalReceiver, signal_bus};
use crate::control::state::{ActualStateWriter, EmbeddedState, StandaloneState, StateTracker};
use crate::core::config::{Config, Deployment};
use crate::core::errors::Result;
use crate::logger::ActivityLogger;
use crate::modules::{BuiltinModules, StatusBoards};
use crate::store::ConfigStore;

/// Everything a process needs to serve the control plane.
pub struct Runtime {
    pub config: Config,
    pub store: Arc<dyn ConfigStore>,
    pub plane: Arc<ControlPlane>,
    pub signals: SignalReceiver,
    pub boards: StatusBoards,
    pub watch: WatchList,
    pub logger: Arc<dyn ActivityLogger>,
    actual: Option<ActualStateWriter>,
}

impl Runtime {
    /// Open the SQLite store and activity logs named in `config`.
    #[cfg(feature = "sqlite")]
    pub fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn ConfigStore> =
            Arc::new(crate::store::SqliteStore::open(&config.paths.db_file)?);
        let logger: Arc<dyn ActivityLogger> = Arc::new(crate::logger::dual::DualLogger::open(
            &config.paths.activity_log,
            &config.paths.db_file,
        ));
        Self::with_store(config, store, logger)
    }

    /// Assemble around an existing store. Desired state (active profile and
    /// module switches) and the profile phase are restored from the store
    /// when present.
    pub fn with_store(
        config: Config,
        store: Arc<dyn ConfigStore>,
        logger: Arc<dyn ActivityLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let desired = store.load_desired_state()?.unwrap_or_default();
        let phase = store.load_profile_phase()?.unwrap_or_default();
        let built = BuiltinModules::build(&store, &config.modules.enabled, &desired.profile)?;
        let (registry, boards) = built.into_parts();

        let (state, actual): (Arc<dyn StateTracker>, Option<ActualStateWriter>) =
            match config.control.deployment {
                Deployment::Standalone => {
                    let state = StandaloneState::new(desired);
                    let writer = state.actual_writer();
                    (Arc::new(state), Some(writer))
                }
                Deployment::Embedded => (Arc::new(EmbeddedState::new(desired)), None),
            };

        let (tx, signals) = signal_bus(
            config.control.signal_queue_capacity,
            config.control.signal_send_timeout(),
        );
        let watch = WatchList::default();
        let plane = ControlPlane::new(
            registry,
            state,
            Arc::clone(&store),
            tx,
            config.control.cascade_timeout(),
        )
        .with_dependency_hook(Arc::new(WatchListHook::new(TARGET_PROCESS, Arc::clone(&watch))))
        .with_profile_phase(phase)
        .with_logger(Arc::clone(&logger));

        Ok(Self {
            config,
            store,
            plane: Arc::new(plane),
            signals,
            boards,
            watch,
            logger,
            actual,
        })
    }

    /// Actual-state writer for the scheduler; `None` in embedded deployments.
    #[must_use]
    pub fn actual_writer(&self) -> Option<ActualStateWriter> {
        self.actual.clone()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("deployment", &self.config.control.deployment)
            .field("plane", &self.plane)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::module_id::ModuleId;
    use crate::control::profile::ProfilePhase;
    use crate::control::state::DesiredState;
    use crate::logger::NullLogger;
    use crate::store::MemoryStore;

    #[test]
    fn restores_persisted_desired_state() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::seeded());
        let mut desired = DesiredState::default();
        desired.modules.cpu = false;
        store.save_desired_state(&desired).unwrap();

        let runtime =
            Runtime::with_store(Config::default(), store, Arc::new(NullLogger)).unwrap();
        assert!(!runtime.plane.desired_state().modules.cpu);
        assert!(runtime.actual_writer().is_some());
    }

    #[test]
    fn restores_persisted_profile_phase() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::seeded());
        store
            .save_profile_phase(&ProfilePhase::Switching {
                from: "default".to_string(),
                to: "night".to_string(),
            })
            .unwrap();
        let runtime =
            Runtime::with_store(Config::default(), store, Arc::new(NullLogger)).unwrap();
        let status = runtime.plane.profile_status();
        assert!(!status.is_consistent());
        assert_eq!(status.active, "default");
    }

    #[test]
    fn embedded_deployment_has_no_actual_writer() {
        let mut config = Config::default();
        config.control.deployment = Deployment::Embedded;
        config.modules.enabled = vec![ModuleId::Live, ModuleId::Disk, ModuleId::Ram];
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::seeded());
        let runtime = Runtime::with_store(config, store, Arc::new(NullLogger)).unwrap();
        assert!(runtime.actual_writer().is_none());
        assert!(runtime.plane.is_module_running("ram"));
        assert!(runtime.plane.get_config_json("cpu").is_err());
    }

    #[test]
    fn enabling_target_attaches_watch_entry() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::seeded());
        let runtime =
            Runtime::with_store(Config::default(), store, Arc::new(NullLogger)).unwrap();
        runtime.plane.set_module_enabled("target", true).unwrap();
        assert_eq!(*runtime.watch.read(), vec![TARGET_PROCESS.to_string()]);
    }
}
