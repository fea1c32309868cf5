//! Scheduler: the single consumer of the Signal bus and the only writer of
//! actual module state.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::control::hooks::WatchList;
use crate::control::module_id::{MODULE_COUNT, ModuleId, SignalTarget};
use crate::control::plane::ControlPlane;
use crate::control::signal::{Signal, SignalReceiver};
use crate::control::state::ActualStateWriter;
use crate::core::errors::{HmError, Result};
use crate::daemon::signals::SignalFlags;
use crate::daemon::worker::{Worker, probe_for};
use crate::logger::{ActivityEvent, ActivityLogger};
use crate::modules::{ModuleStatus, StatusBoards, settings};
use crate::store::ConfigStore;

/// Timing knobs for [`Scheduler::run`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    /// Interval between worker samples.
    pub tick: Duration,
    /// How long the loop waits for a Signal before checking flags.
    pub poll: Duration,
    /// How often the persisted desired state is compared with memory.
    pub sync: Duration,
}

impl SchedulerTiming {
    #[must_use]
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            poll: Duration::from_millis(250),
            sync: Duration::from_secs(2),
        }
    }
}

pub struct Scheduler {
    plane: Arc<ControlPlane>,
    store: Arc<dyn ConfigStore>,
    actual: ActualStateWriter,
    boards: StatusBoards,
    watch: WatchList,
    logger: Arc<dyn ActivityLogger>,
    timing: SchedulerTiming,
    workers: [Option<Worker>; MODULE_COUNT],
    status_file: Option<PathBuf>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        plane: Arc<ControlPlane>,
        store: Arc<dyn ConfigStore>,
        actual: ActualStateWriter,
        boards: StatusBoards,
        watch: WatchList,
        logger: Arc<dyn ActivityLogger>,
        timing: SchedulerTiming,
    ) -> Self {
        Self {
            plane,
            store,
            actual,
            boards,
            watch,
            logger,
            timing,
            workers: Default::default(),
            status_file: None,
        }
    }

    /// Publish status snapshots to `path` so other processes can read them.
    #[must_use]
    pub fn with_status_file(mut self, path: PathBuf) -> Self {
        self.status_file = Some(path);
        self
    }

    /// Snapshot of every registered module's status board.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<ModuleId, ModuleStatus> {
        ModuleId::ALL
            .into_iter()
            .filter_map(|id| self.boards.get(id).map(|board| (id, board.snapshot())))
            .collect()
    }

    /// Write [`Self::statuses`] to the status file, replacing it atomically.
    pub fn publish_status(&self) -> Result<()> {
        let Some(path) = &self.status_file else {
            return Ok(());
        };
        let body = serde_json::to_vec_pretty(&self.statuses())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| HmError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| HmError::io(path, e))
    }

    /// Modules with a live worker, in registry order.
    #[must_use]
    pub fn running(&self) -> Vec<ModuleId> {
        ModuleId::ALL
            .into_iter()
            .filter(|id| self.workers[id.index()].is_some())
            .collect()
    }

    /// Start every module the desired state wants; used at boot.
    pub fn start_desired(&mut self) -> Result<()> {
        self.apply(Signal::restart_all())
    }

    /// Apply one Signal.
    pub fn apply(&mut self, signal: Signal) -> Result<()> {
        match signal.target {
            SignalTarget::Module(ModuleId::Notify) => Ok(()),
            SignalTarget::Module(id) if signal.run => self.start(id, true),
            SignalTarget::Module(id) => {
                // reload with the module's current config, which a failed
                // switch may have left on a profile other than the active one
                self.stop(id);
                if self.plane.desired_state().modules.get(id) {
                    self.start(id, false)?;
                }
                Ok(())
            }
            SignalTarget::All => {
                let desired = self.plane.desired_state().modules;
                let mut first_err = None;
                for id in ModuleId::CONTROLLABLE {
                    self.stop(id);
                    if signal.run && desired.get(id) {
                        if let Err(err) = self.start(id, true) {
                            first_err.get_or_insert(err);
                        }
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
        }
    }

    /// Spawn a worker for `id`. With `activate`, the module first loads its
    /// stored config for the active profile.
    fn start(&mut self, id: ModuleId, activate: bool) -> Result<()> {
        let registry = self.plane.registry();
        if !registry.contains(id) {
            return Ok(());
        }
        let active = self.plane.active_profile();
        if activate {
            registry.save(id, None, &active)?;
        }
        let raw = registry.config_json(id)?;
        let config: serde_json::Value = serde_json::from_slice(&raw)?;
        let profile = Some(settings::profile_of(&raw))
            .filter(|p| !p.is_empty())
            .unwrap_or(active);

        self.stop(id);
        let Some(board) = self.boards.get(id).cloned() else {
            return Ok(());
        };
        board.mark_started(&profile);
        let probe = probe_for(id, &config, &self.watch);
        let worker = Worker::spawn(id, Arc::clone(&board), probe, self.timing.tick);
        match worker {
            Ok(worker) => {
                self.workers[id.index()] = Some(worker);
                self.actual.mark(id, true);
                self.logger.log(ActivityEvent::SignalApplied {
                    module: id,
                    running: true,
                });
                Ok(())
            }
            Err(err) => {
                board.mark_stopped();
                Err(err)
            }
        }
    }

    fn stop(&mut self, id: ModuleId) {
        let Some(worker) = self.workers[id.index()].take() else {
            return;
        };
        worker.stop();
        if let Some(board) = self.boards.get(id) {
            board.mark_stopped();
        }
        self.actual.mark(id, false);
        self.logger.log(ActivityEvent::SignalApplied {
            module: id,
            running: false,
        });
    }

    /// Bring memory in line with the persisted desired state, which another
    /// process (the CLI) may have changed. Emits Signals through the plane.
    pub fn sync_from_store(&self) -> Result<()> {
        let Some(persisted) = self.store.load_desired_state()? else {
            return Ok(());
        };
        let current = self.plane.desired_state();
        if persisted.profile != current.profile {
            self.plane.load_profile(&persisted.profile)?;
        }
        for id in ModuleId::CONTROLLABLE {
            let wanted = persisted.modules.get(id);
            if wanted != current.modules.get(id) && self.plane.registry().contains(id) {
                self.plane.set_module_enabled(id.as_str(), wanted)?;
            }
        }
        Ok(())
    }

    /// Consume Signals until shutdown is requested or every sender is gone.
    pub fn run(&mut self, signals: &SignalReceiver, flags: &SignalFlags) -> Result<()> {
        self.logger.log(ActivityEvent::SchedulerStarted);
        let mut last_sync = Instant::now();
        while !flags.shutdown_requested() {
            if flags.take_reload() {
                self.report(self.sync_from_store(), "reload");
                let restarted = self.apply(Signal::restart_all());
                self.report(restarted, "reload");
            }
            match signals.recv_timeout(self.timing.poll) {
                Ok(Some(signal)) => {
                    let applied = self.apply(signal);
                    self.report(applied, &format!("apply {signal}"));
                    self.report(self.publish_status(), "publish status");
                }
                Ok(None) => {
                    if last_sync.elapsed() >= self.timing.sync {
                        self.report(self.sync_from_store(), "sync");
                        self.report(self.publish_status(), "publish status");
                        last_sync = Instant::now();
                    }
                }
                Err(_) => break,
            }
        }
        self.shutdown();
        self.publish_status()
    }

    fn report(&self, result: Result<()>, context: &str) {
        if let Err(err) = result {
            self.logger.log(ActivityEvent::Error {
                context: context.to_string(),
                details: err.to_string(),
            });
        }
    }

    /// Stop and join every worker.
    pub fn shutdown(&mut self) {
        for id in ModuleId::ALL {
            self.stop(id);
        }
        self.logger.log(ActivityEvent::SchedulerStopped);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for slot in &mut self.workers {
            if let Some(worker) = slot.take() {
                worker.stop();
            }
        }
    }
}
