//! Profile manager: config persistence and switching the active profile
//! across every registered module.
//!
//! A switch runs in two phases. The dry run asks every other module whether
//! it can activate the new profile (`check_profile`) and mutates nothing. The
//! apply phase saves the triggering module's data, then tells every other
//! module to activate its stored configuration (`save_config(None, ..)`).
//! Each module call is bounded by the cascade timeout.
//!
//! An apply-phase failure is not rolled back. The active profile keeps its old
//! name and the manager enters [`ProfilePhase::Inconsistent`], naming the
//! modules that already hold the new profile. The next successful switch or
//! profile load clears it. Every phase change is written to the store, so a
//! later process reports the same phase.
//!
//! All mutating operations hold one switch lock. They return the Signals they
//! produce instead of sending them, so the caller can send after the lock is
//! released.

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::control::module_id::ModuleId;
use crate::control::registry::{ModuleCapability, ModuleHandle, ModuleRegistry};
use crate::control::signal::Signal;
use crate::control::state::StateTracker;
use crate::core::errors::{HmError, Result};
use crate::logger::{ActivityEvent, ActivityLogger};
use crate::modules::settings;
use crate::store::ConfigStore;

static PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("profile name pattern is valid")
});

/// Reject names that are empty, too long, or contain anything but
/// alphanumerics, `_`, `.`, `-` (first character alphanumeric).
pub fn validate_profile_name(name: &str) -> Result<()> {
    if PROFILE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(HmError::InvalidProfileName {
            name: name.to_string(),
        })
    }
}

/// Where the profile lifecycle currently stands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProfilePhase {
    /// Every module holds the active profile.
    #[default]
    Stable,
    Switching { from: String, to: String },
    /// A switch from `from` to `to` stopped at `failed`; `switched` hold `to`.
    Inconsistent {
        from: String,
        to: String,
        switched: Vec<ModuleId>,
        failed: ModuleId,
        error: String,
    },
}

/// Active profile name together with the lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileStatus {
    pub active: String,
    #[serde(flatten)]
    pub phase: ProfilePhase,
}

impl ProfileStatus {
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self.phase, ProfilePhase::Stable)
    }
}

/// Collaborators a profile operation works against.
pub struct ProfileContext<'a> {
    pub registry: &'a ModuleRegistry,
    pub state: &'a dyn StateTracker,
    pub store: &'a dyn ConfigStore,
    pub logger: &'a dyn ActivityLogger,
}

/// Result of a mutating operation plus the Signals it produced. Signals are
/// returned even when the result is an error, if something was already applied.
#[derive(Debug)]
pub struct Outcome {
    pub signals: Vec<Signal>,
    pub result: Result<()>,
}

impl Outcome {
    fn failed(err: HmError) -> Self {
        Self {
            signals: Vec::new(),
            result: Err(err),
        }
    }
}

#[derive(Debug)]
pub struct ProfileManager {
    switch_lock: Mutex<()>,
    phase: RwLock<ProfilePhase>,
    cascade_timeout: Duration,
}

impl ProfileManager {
    #[must_use]
    pub fn new(cascade_timeout: Duration) -> Self {
        Self {
            switch_lock: Mutex::new(()),
            phase: RwLock::new(ProfilePhase::Stable),
            cascade_timeout,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ProfilePhase {
        self.phase.read().clone()
    }

    /// Resume from a phase persisted by an earlier process.
    pub fn restore(&self, phase: ProfilePhase) {
        *self.phase.write() = phase;
    }

    /// Record `phase` in memory and in the store. A store failure is logged;
    /// the in-memory phase still moves.
    fn enter(&self, ctx: &ProfileContext<'_>, phase: ProfilePhase) {
        if let Err(err) = ctx.store.save_profile_phase(&phase) {
            ctx.logger.log(ActivityEvent::Error {
                context: "save profile phase".to_string(),
                details: err.to_string(),
            });
        }
        *self.phase.write() = phase;
    }

    /// Save `data` for `id` and, when its `Profile` differs from the active
    /// profile, switch every other module to that profile.
    pub fn save_config(&self, ctx: &ProfileContext<'_>, id: ModuleId, data: &[u8]) -> Outcome {
        let _guard = self.switch_lock.lock();

        let handle = match ctx.registry.resolve(id) {
            Ok(handle) => ModuleHandle::clone(handle),
            Err(err) => return Outcome::failed(err),
        };

        let active = ctx.state.active_profile();
        let requested = settings::profile_of(data);
        let profile = if requested.is_empty() {
            active.clone()
        } else {
            if let Err(err) = validate_profile_name(&requested) {
                return Outcome::failed(err);
            }
            requested
        };
        let switching = profile != active;
        let others: Vec<ModuleId> = ctx.registry.ids().filter(|other| *other != id).collect();

        if switching {
            if let Err(err) = self.preflight(ctx, &others, &profile) {
                return Outcome::failed(err);
            }
        }

        let owned = data.to_vec();
        let target = profile.clone();
        if let Err(err) = self.bounded(id, &profile, handle, move |module| {
            module.save_config(Some(&owned), &target)
        }) {
            return Outcome::failed(err);
        }
        ctx.logger.log(ActivityEvent::ConfigSaved {
            module: id,
            profile: profile.clone(),
        });

        let mut signals = Vec::new();
        if ctx.state.stops_on_save() {
            signals.push(Signal::stop(id));
        }

        if !switching {
            return Outcome {
                signals,
                result: Ok(()),
            };
        }

        let result = self.cascade(ctx, id, &others, &active, &profile);
        if ctx.state.stops_on_save() && ctx.state.active_profile() == profile {
            // running workers captured the old profile's settings
            signals.push(Signal::restart_all());
        }
        Outcome { signals, result }
    }

    /// Make `name` the active profile and ask the scheduler to restart every
    /// module under it.
    pub fn load_profile(&self, ctx: &ProfileContext<'_>, name: &str) -> Outcome {
        let _guard = self.switch_lock.lock();

        let available = match ctx.store.list_profiles() {
            Ok(available) => available,
            Err(err) => return Outcome::failed(err),
        };
        if !available.iter().any(|profile| profile == name) {
            return Outcome::failed(HmError::ProfileNotFound {
                name: name.to_string(),
                available,
            });
        }

        ctx.state.set_active_profile(name);
        self.enter(ctx, ProfilePhase::Stable);
        ctx.logger.log(ActivityEvent::ProfileLoaded {
            profile: name.to_string(),
        });
        Outcome {
            signals: vec![Signal::restart_all()],
            result: ctx.store.save_desired_state(&ctx.state.desired()),
        }
    }

    fn preflight(&self, ctx: &ProfileContext<'_>, others: &[ModuleId], profile: &str) -> Result<()> {
        for &other in others {
            let handle = ModuleHandle::clone(ctx.registry.resolve(other)?);
            let target = profile.to_string();
            self.bounded(other, profile, handle, move |module| {
                module.check_profile(&target)
            })
            .map_err(|err| wrap_cascade_error(other, profile, err))?;
        }
        Ok(())
    }

    fn cascade(
        &self,
        ctx: &ProfileContext<'_>,
        trigger: ModuleId,
        others: &[ModuleId],
        from: &str,
        to: &str,
    ) -> Result<()> {
        self.enter(
            ctx,
            ProfilePhase::Switching {
                from: from.to_string(),
                to: to.to_string(),
            },
        );

        let mut switched = vec![trigger];
        for &other in others {
            let applied = ctx.registry.resolve(other).map(ModuleHandle::clone).and_then(|handle| {
                let target = to.to_string();
                self.bounded(other, to, handle, move |module| {
                    module.save_config(None, &target)
                })
            });
            if let Err(err) = applied {
                let err = wrap_cascade_error(other, to, err);
                self.enter(
                    ctx,
                    ProfilePhase::Inconsistent {
                        from: from.to_string(),
                        to: to.to_string(),
                        switched: switched.clone(),
                        failed: other,
                        error: err.to_string(),
                    },
                );
                ctx.logger.log(ActivityEvent::CascadeFailed {
                    from: from.to_string(),
                    to: to.to_string(),
                    switched,
                    failed: other,
                    error: err.to_string(),
                });
                return Err(err);
            }
            switched.push(other);
        }

        ctx.state.set_active_profile(to);
        self.enter(ctx, ProfilePhase::Stable);
        ctx.logger.log(ActivityEvent::ProfileSwitched {
            from: from.to_string(),
            to: to.to_string(),
        });
        ctx.store.save_desired_state(&ctx.state.desired())
    }

    /// Run `op` against `handle` on a helper thread and wait at most the
    /// cascade timeout. A module that hangs past the deadline keeps its thread
    /// until it returns; its late result is discarded.
    fn bounded<F>(&self, id: ModuleId, profile: &str, handle: ModuleHandle, op: F) -> Result<()>
    where
        F: FnOnce(&dyn ModuleCapability) -> Result<()> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name(format!("hm-save-{id}"))
            .spawn(move || {
                let _ = tx.send(op(&*handle));
            })
            .map_err(|e| HmError::Runtime {
                details: format!("spawn save worker for {id}: {e}"),
            })?;

        match rx.recv_timeout(self.cascade_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(HmError::CascadeTimeout {
                module: id.as_str(),
                profile: profile.to_string(),
                timeout: self.cascade_timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(HmError::CascadeFailure {
                module: id.as_str(),
                profile: profile.to_string(),
                details: "save worker exited without a result".to_string(),
            }),
        }
    }
}

fn wrap_cascade_error(module: ModuleId, profile: &str, err: HmError) -> HmError {
    match err {
        HmError::CascadeTimeout { .. } | HmError::CascadeFailure { .. } => err,
        other => HmError::CascadeFailure {
            module: module.as_str(),
            profile: profile.to_string(),
            details: other.to_string(),
        },
    }
}
