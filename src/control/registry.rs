//! Module registry: binds each [`ModuleId`] to its capability implementation.
//!
//! The registry is assembled once through [`RegistryBuilder`] and is immutable
//! afterwards, so lookups need no synchronization. Every dispatch goes through
//! [`ModuleRegistry::resolve`], which turns a missing entry into
//! [`HmError::ModuleNotFound`] instead of a call on an absent implementation.

use std::fmt;
use std::sync::Arc;

use crate::control::module_id::{MODULE_COUNT, ModuleId};
use crate::core::errors::{HmError, Result};

/// Capability contract every module implements.
pub trait ModuleCapability: Send + Sync {
    /// JSON bytes describing the module's current status.
    fn status_json(&self) -> Vec<u8>;

    /// JSON bytes describing the module's current configuration.
    fn config_json(&self) -> Vec<u8>;

    /// Persist `data` under `profile`, or, when `data` is `None`, activate the
    /// configuration already stored for `profile`.
    fn save_config(&self, data: Option<&[u8]>, profile: &str) -> Result<()>;

    /// Dry run of `save_config(None, profile)`: must not mutate anything.
    fn check_profile(&self, _profile: &str) -> Result<()> {
        Ok(())
    }
}

type StatusFn = dyn Fn() -> Vec<u8> + Send + Sync;
type SaveFn = dyn Fn(Option<&[u8]>, &str) -> Result<()> + Send + Sync;

/// Capability assembled from three closures, for hosts that already have
/// free functions for status/config/save.
pub struct FnModule {
    status: Box<StatusFn>,
    config: Box<StatusFn>,
    save: Box<SaveFn>,
}

impl FnModule {
    pub fn new(
        status: impl Fn() -> Vec<u8> + Send + Sync + 'static,
        config: impl Fn() -> Vec<u8> + Send + Sync + 'static,
        save: impl Fn(Option<&[u8]>, &str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            status: Box::new(status),
            config: Box::new(config),
            save: Box::new(save),
        }
    }
}

impl fmt::Debug for FnModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModule").finish_non_exhaustive()
    }
}

impl ModuleCapability for FnModule {
    fn status_json(&self) -> Vec<u8> {
        (self.status)()
    }

    fn config_json(&self) -> Vec<u8> {
        (self.config)()
    }

    fn save_config(&self, data: Option<&[u8]>, profile: &str) -> Result<()> {
        (self.save)(data, profile)
    }
}

/// Shared handle to a registered capability.
pub type ModuleHandle = Arc<dyn ModuleCapability>;

/// Collects registrations at startup.
#[derive(Default)]
pub struct RegistryBuilder {
    slots: [Option<ModuleHandle>; MODULE_COUNT],
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` for `id`. Each id may be registered exactly once.
    pub fn register(mut self, id: ModuleId, module: ModuleHandle) -> Result<Self> {
        let slot = &mut self.slots[id.index()];
        if slot.is_some() {
            return Err(HmError::DuplicateModule {
                module: id.as_str(),
            });
        }
        *slot = Some(module);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry { slots: self.slots }
    }
}

/// Immutable id -> capability table.
pub struct ModuleRegistry {
    slots: [Option<ModuleHandle>; MODULE_COUNT],
}

impl ModuleRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up the capability registered for `id`.
    pub fn resolve(&self, id: ModuleId) -> Result<&ModuleHandle> {
        self.slots[id.index()]
            .as_ref()
            .ok_or_else(|| HmError::module_not_found(id.as_str()))
    }

    /// Canonicalize a raw name (aliases included) and look it up.
    pub fn resolve_name(&self, raw: &str) -> Result<(ModuleId, &ModuleHandle)> {
        let id = ModuleId::canonicalize(raw).ok_or_else(|| HmError::module_not_found(raw))?;
        let handle = self
            .slots[id.index()]
            .as_ref()
            .ok_or_else(|| HmError::module_not_found(raw))?;
        Ok((id, handle))
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Registered ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        ModuleId::ALL.into_iter().filter(|id| self.contains(*id))
    }

    /// Status JSON; modules without a status surface (`notify`) are not found.
    pub fn status_json(&self, id: ModuleId) -> Result<Vec<u8>> {
        if !id.is_controllable() {
            return Err(HmError::module_not_found(id.as_str()));
        }
        Ok(self.resolve(id)?.status_json())
    }

    pub fn config_json(&self, id: ModuleId) -> Result<Vec<u8>> {
        Ok(self.resolve(id)?.config_json())
    }

    pub fn save(&self, id: ModuleId, data: Option<&[u8]>, profile: &str) -> Result<()> {
        self.resolve(id)?.save_config(data, profile)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}
