//! Control-plane facade consumed by transports (CLI, web handlers, embedding hosts).
//!
//! Every operation takes a raw module name, canonicalizes it (`inode` ->
//! `disk`), and resolves it through the registry before dispatching, so an
//! unknown or unregistered name is always [`HmError::ModuleNotFound`].

use std::sync::Arc;
use std::time::Duration;

use crate::control::hooks::{DependencyHook, NoopHook};
use crate::control::module_id::ModuleId;
use crate::control::profile::{
    Outcome, ProfileContext, ProfileManager, ProfilePhase, ProfileStatus,
};
use crate::control::registry::ModuleRegistry;
use crate::control::signal::{Signal, SignalSender};
use crate::control::state::{DesiredState, StateTracker};
use crate::core::errors::{HmError, Result};
use crate::logger::{ActivityEvent, ActivityLogger, NullLogger};
use crate::store::ConfigStore;

/// Pseudo-module the UI shell is served under; always available.
pub const MAIN_PSEUDO_MODULE: &str = "main";

pub struct ControlPlane {
    registry: ModuleRegistry,
    state: Arc<dyn StateTracker>,
    store: Arc<dyn ConfigStore>,
    signals: SignalSender,
    profiles: ProfileManager,
    hook: Arc<dyn DependencyHook>,
    logger: Arc<dyn ActivityLogger>,
}

impl ControlPlane {
    #[must_use]
    pub fn new(
        registry: ModuleRegistry,
        state: Arc<dyn StateTracker>,
        store: Arc<dyn ConfigStore>,
        signals: SignalSender,
        cascade_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            state,
            store,
            signals,
            profiles: ProfileManager::new(cascade_timeout),
            hook: Arc::new(NoopHook),
            logger: Arc::new(NullLogger),
        }
    }

    /// Hook run when `target` is enabled or disabled, before its Signal.
    #[must_use]
    pub fn with_dependency_hook(mut self, hook: Arc<dyn DependencyHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Resume a profile phase recorded by an earlier process.
    #[must_use]
    pub fn with_profile_phase(self, phase: ProfilePhase) -> Self {
        self.profiles.restore(phase);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ActivityLogger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    fn resolve(&self, module: &str) -> Result<ModuleId> {
        self.registry.resolve_name(module).map(|(id, _)| id)
    }

    fn context(&self) -> ProfileContext<'_> {
        ProfileContext {
            registry: &self.registry,
            state: self.state.as_ref(),
            store: self.store.as_ref(),
            logger: self.logger.as_ref(),
        }
    }

    fn send(&self, signal: Signal) -> Result<()> {
        self.signals.send(signal)?;
        self.logger.log(ActivityEvent::SignalSent { signal });
        Ok(())
    }

    /// Send what an operation produced (no locks are held here), then report
    /// the operation's own error first.
    fn finish(&self, outcome: Outcome) -> Result<()> {
        let mut send_result = Ok(());
        for signal in outcome.signals {
            if let Err(err) = self.send(signal) {
                send_result = Err(err);
                break;
            }
        }
        outcome.result.and(send_result)
    }

    pub fn get_status_json(&self, module: &str) -> Result<Vec<u8>> {
        let id = self.resolve(module)?;
        self.registry.status_json(id)
    }

    pub fn get_config_json(&self, module: &str) -> Result<Vec<u8>> {
        let id = self.resolve(module)?;
        self.registry.config_json(id)
    }

    /// Persist a module's config; a new `Profile` value switches every module.
    pub fn save_config(&self, module: &str, data: &[u8]) -> Result<()> {
        let id = self.resolve(module)?;
        let outcome = self.profiles.save_config(&self.context(), id, data);
        if let Err(err) = &outcome.result {
            self.logger.log(ActivityEvent::Error {
                context: format!("save_config {id}"),
                details: err.to_string(),
            });
        }
        self.finish(outcome)
    }

    /// Record operator intent and signal the scheduler. Enabling or disabling
    /// `target` attaches/detaches its process dependency before the Signal.
    ///
    /// If the hook or the send fails, the previous desired flag is put back
    /// and nothing is persisted, so a retry starts from the same state.
    pub fn set_module_enabled(&self, module: &str, enabled: bool) -> Result<()> {
        let id = self.resolve(module)?;
        if !id.is_controllable() {
            return Err(HmError::module_not_found(module));
        }

        let previous = self.state.desired().modules.get(id);
        self.state.set_desired(id, enabled);
        if let Err(err) = self.apply_toggle(id, enabled) {
            self.state.set_desired(id, previous);
            self.logger.log(ActivityEvent::Error {
                context: format!("set_module_enabled {id}"),
                details: err.to_string(),
            });
            return Err(err);
        }
        self.logger.log(ActivityEvent::ModuleToggled {
            module: id,
            enabled,
        });
        self.store.save_desired_state(&self.state.desired())
    }

    fn apply_toggle(&self, id: ModuleId, enabled: bool) -> Result<()> {
        let is_target = id == ModuleId::Target;
        if is_target {
            if enabled {
                self.hook.attach()?;
            } else {
                self.hook.detach()?;
            }
        }

        let sent = self.send(Signal {
            target: id.into(),
            run: enabled,
        });
        if sent.is_err() && is_target {
            // undo the hook so the dependency matches the restored flag
            let undone = if enabled {
                self.hook.detach()
            } else {
                self.hook.attach()
            };
            if let Err(err) = undone {
                self.logger.log(ActivityEvent::Error {
                    context: format!("undo dependency hook for {id}"),
                    details: err.to_string(),
                });
            }
        }
        sent
    }

    /// Running status; unknown names are simply not running.
    #[must_use]
    pub fn is_module_running(&self, module: &str) -> bool {
        ModuleId::canonicalize(module).is_some_and(|id| self.state.is_running(id))
    }

    /// Whether a transport may serve live data for `module`.
    #[must_use]
    pub fn can_serve(&self, module: &str) -> bool {
        module == MAIN_PSEUDO_MODULE || self.is_module_running(module)
    }

    pub fn load_profile(&self, name: &str) -> Result<()> {
        let outcome = self.profiles.load_profile(&self.context(), name);
        self.finish(outcome)
    }

    pub fn list_profiles(&self) -> Result<Vec<String>> {
        self.store.list_profiles()
    }

    #[must_use]
    pub fn active_profile(&self) -> String {
        self.state.active_profile()
    }

    #[must_use]
    pub fn profile_status(&self) -> ProfileStatus {
        ProfileStatus {
            active: self.state.active_profile(),
            phase: self.profiles.phase(),
        }
    }

    #[must_use]
    pub fn desired_state(&self) -> DesiredState {
        self.state.desired()
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("registry", &self.registry)
            .field("desired", &self.state.desired())
            .field("phase", &self.profiles.phase())
            .finish_non_exhaustive()
    }
}
