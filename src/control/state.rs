//! Desired vs actual module state.
//!
//! [`StateTracker`] is the one interface the control plane talks to. Two thin
//! adapters implement it:
//!
//! - [`StandaloneState`]: desired and actual are separate records. The control
//!   plane writes desired; only the scheduler writes actual, through an
//!   [`ActualStateWriter`], after it has consumed a Signal.
//! - [`EmbeddedState`]: a host process owns the workers and desired/actual are
//!   one shared record, updated synchronously.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::control::module_id::ModuleId;

/// Name of the profile every fresh store starts with.
pub const DEFAULT_PROFILE: &str = "default";

/// One on/off flag per controllable module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleFlags {
    pub live: bool,
    pub target: bool,
    pub disk: bool,
    pub ram: bool,
    pub cpu: bool,
}

impl ModuleFlags {
    /// Every controllable module switched on.
    #[must_use]
    pub const fn all_on() -> Self {
        Self {
            live: true,
            target: true,
            disk: true,
            ram: true,
            cpu: true,
        }
    }

    #[must_use]
    pub const fn get(&self, id: ModuleId) -> bool {
        match id {
            ModuleId::Live => self.live,
            ModuleId::Target => self.target,
            ModuleId::Disk => self.disk,
            ModuleId::Ram => self.ram,
            ModuleId::Cpu => self.cpu,
            ModuleId::Notify => false,
        }
    }

    /// Set the flag for `id`. `notify` has no flag and is ignored.
    pub fn set(&mut self, id: ModuleId, on: bool) {
        match id {
            ModuleId::Live => self.live = on,
            ModuleId::Target => self.target = on,
            ModuleId::Disk => self.disk = on,
            ModuleId::Ram => self.ram = on,
            ModuleId::Cpu => self.cpu = on,
            ModuleId::Notify => {}
        }
    }

    /// Modules whose flag is on, in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = ModuleId> + '_ {
        ModuleId::CONTROLLABLE
            .into_iter()
            .filter(|id| self.get(*id))
    }
}

/// Operator intent: which modules should run and under which profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(flatten)]
    pub modules: ModuleFlags,
    pub profile: String,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            modules: ModuleFlags::all_on(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

/// Uniform view over desired/actual state for the control plane.
pub trait StateTracker: Send + Sync {
    /// Record operator intent for `id`. Setting an unchanged value is a no-op.
    fn set_desired(&self, id: ModuleId, enabled: bool);

    fn desired(&self) -> DesiredState;

    /// Whether `id` is currently running.
    fn is_running(&self, id: ModuleId) -> bool;

    fn active_profile(&self) -> String;

    fn set_active_profile(&self, profile: &str);

    /// Whether a config save must be followed by a stop Signal so the
    /// scheduler reloads the module.
    fn stops_on_save(&self) -> bool;
}

/// Desired and actual kept apart; actual only moves when the scheduler applies a Signal.
#[derive(Debug)]
pub struct StandaloneState {
    desired: RwLock<DesiredState>,
    actual: Arc<RwLock<ModuleFlags>>,
}

impl StandaloneState {
    /// Nothing is running until the scheduler says so.
    #[must_use]
    pub fn new(desired: DesiredState) -> Self {
        Self {
            desired: RwLock::new(desired),
            actual: Arc::new(RwLock::new(ModuleFlags::default())),
        }
    }

    /// Handle for the scheduler, the only writer of actual state.
    #[must_use]
    pub fn actual_writer(&self) -> ActualStateWriter {
        ActualStateWriter {
            actual: Arc::clone(&self.actual),
        }
    }

    #[must_use]
    pub fn actual(&self) -> ModuleFlags {
        *self.actual.read()
    }
}

impl StateTracker for StandaloneState {
    fn set_desired(&self, id: ModuleId, enabled: bool) {
        self.desired.write().modules.set(id, enabled);
    }

    fn desired(&self) -> DesiredState {
        self.desired.read().clone()
    }

    fn is_running(&self, id: ModuleId) -> bool {
        self.actual.read().get(id)
    }

    fn active_profile(&self) -> String {
        self.desired.read().profile.clone()
    }

    fn set_active_profile(&self, profile: &str) {
        profile.clone_into(&mut self.desired.write().profile);
    }

    fn stops_on_save(&self) -> bool {
        true
    }
}

/// Write access to actual state, handed to the scheduler.
#[derive(Debug, Clone)]
pub struct ActualStateWriter {
    actual: Arc<RwLock<ModuleFlags>>,
}

impl ActualStateWriter {
    pub fn mark(&self, id: ModuleId, running: bool) {
        self.actual.write().set(id, running);
    }

    #[must_use]
    pub fn snapshot(&self) -> ModuleFlags {
        *self.actual.read()
    }
}

/// Desired and actual are the same record, shared with the embedding host.
#[derive(Debug, Clone)]
pub struct EmbeddedState {
    record: Arc<RwLock<DesiredState>>,
}

impl EmbeddedState {
    #[must_use]
    pub fn new(initial: DesiredState) -> Self {
        Self {
            record: Arc::new(RwLock::new(initial)),
        }
    }

    /// The shared record, for the host to read and update as it starts/stops workers.
    #[must_use]
    pub fn shared_record(&self) -> Arc<RwLock<DesiredState>> {
        Arc::clone(&self.record)
    }
}

impl StateTracker for EmbeddedState {
    fn set_desired(&self, id: ModuleId, enabled: bool) {
        self.record.write().modules.set(id, enabled);
    }

    fn desired(&self) -> DesiredState {
        self.record.read().clone()
    }

    fn is_running(&self, id: ModuleId) -> bool {
        self.record.read().modules.get(id)
    }

    fn active_profile(&self) -> String {
        self.record.read().profile.clone()
    }

    fn set_active_profile(&self, profile: &str) {
        profile.clone_into(&mut self.record.write().profile);
    }

    fn stops_on_save(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_desired_does_not_leak_into_actual() {
        let state = StandaloneState::new(DesiredState::default());
        assert!(state.desired().modules.get(ModuleId::Cpu));
        assert!(!state.is_running(ModuleId::Cpu));

        state.actual_writer().mark(ModuleId::Cpu, true);
        assert!(state.is_running(ModuleId::Cpu));

        state.set_desired(ModuleId::Cpu, false);
        assert!(state.is_running(ModuleId::Cpu), "actual only moves via the scheduler");
    }

    #[test]
    fn embedded_state_is_one_record() {
        let state = EmbeddedState::new(DesiredState {
            modules: ModuleFlags::default(),
            profile: "p1".to_string(),
        });
        state.set_desired(ModuleId::Ram, true);
        assert!(state.is_running(ModuleId::Ram));
        assert!(state.shared_record().read().modules.ram);
        assert!(!state.stops_on_save());
    }

    #[test]
    fn notify_has_no_flag() {
        let mut flags = ModuleFlags::all_on();
        flags.set(ModuleId::Notify, true);
        assert!(!flags.get(ModuleId::Notify));
        assert_eq!(flags.enabled().count(), 5);
    }

    #[test]
    fn desired_state_serializes_flat() {
        let state = DesiredState::default();
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["profile"], DEFAULT_PROFILE);
        assert_eq!(value["disk"], true);
    }

    #[test]
    fn profile_updates_are_visible() {
        let state = StandaloneState::new(DesiredState::default());
        state.set_active_profile("night");
        assert_eq!(state.active_profile(), "night");
        assert_eq!(state.desired().profile, "night");
    }
}
