//! Store-backed implementation of the module capability contract.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::settings;
use super::status::StatusBoard;
use crate::control::module_id::ModuleId;
use crate::control::registry::ModuleCapability;
use crate::core::errors::{HmError, Result};
use crate::store::ConfigStore;

/// A module whose configuration lives in a [`ConfigStore`] and whose status
/// is whatever its worker last wrote to the [`StatusBoard`].
pub struct StoredModule {
    id: ModuleId,
    store: Arc<dyn ConfigStore>,
    current: RwLock<Value>,
    board: Arc<StatusBoard>,
}

impl StoredModule {
    /// Load the configuration for `profile`, falling back to defaults when the
    /// store has nothing for this module yet.
    pub fn load(id: ModuleId, store: Arc<dyn ConfigStore>, profile: &str) -> Result<Self> {
        let current = match store.load_module_config(id, profile)? {
            Some(stored) => settings::normalize(id, &stored, profile)?,
            None => settings::default_config(id, profile),
        };
        Ok(Self {
            id,
            store,
            current: RwLock::new(current),
            board: Arc::new(StatusBoard::new(id)),
        })
    }

    #[must_use]
    pub const fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn status_board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.board)
    }

    #[must_use]
    pub fn current_config(&self) -> Value {
        self.current.read().clone()
    }

    fn persist_new(&self, data: &[u8], profile: &str) -> Result<()> {
        let raw: Value = serde_json::from_slice(data).map_err(|e| HmError::InvalidModuleConfig {
            module: self.id.as_str(),
            details: e.to_string(),
        })?;
        let config = settings::normalize(self.id, &raw, profile)?;
        self.store.save_module_config(self.id, profile, &config)?;
        *self.current.write() = config;
        Ok(())
    }

    fn activate_stored(&self, profile: &str) -> Result<()> {
        let config = match self.store.load_module_config(self.id, profile)? {
            Some(stored) => settings::normalize(self.id, &stored, profile)?,
            None => {
                let defaults = settings::default_config(self.id, profile);
                self.store.save_module_config(self.id, profile, &defaults)?;
                defaults
            }
        };
        *self.current.write() = config;
        Ok(())
    }
}

impl std::fmt::Debug for StoredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredModule")
            .field("id", &self.id)
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

impl ModuleCapability for StoredModule {
    fn status_json(&self) -> Vec<u8> {
        serde_json::to_vec(&self.board.snapshot()).unwrap_or_else(|_| b"{}".to_vec())
    }

    fn config_json(&self) -> Vec<u8> {
        serde_json::to_vec(&*self.current.read()).unwrap_or_else(|_| b"{}".to_vec())
    }

    fn save_config(&self, data: Option<&[u8]>, profile: &str) -> Result<()> {
        match data {
            Some(data) => self.persist_new(data, profile),
            None => self.activate_stored(profile),
        }
    }

    fn check_profile(&self, profile: &str) -> Result<()> {
        if let Some(stored) = self.store.load_module_config(self.id, profile)? {
            settings::normalize(self.id, &stored, profile)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::DEFAULT_PROFILE;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn module(id: ModuleId) -> (StoredModule, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::seeded());
        let module = StoredModule::load(id, store.clone(), DEFAULT_PROFILE).unwrap();
        (module, store)
    }

    #[test]
    fn save_with_data_persists_under_profile() {
        let (module, store) = module(ModuleId::Cpu);
        module
            .save_config(Some(br#"{"Profile":"night","CpuWarningPercent":70}"#), "night")
            .unwrap();
        let stored = store.load_module_config(ModuleId::Cpu, "night").unwrap().unwrap();
        assert_eq!(stored["CpuWarningPercent"], 70);
        assert_eq!(module.current_config()["Profile"], "night");
        let default_row = store
            .load_module_config(ModuleId::Cpu, DEFAULT_PROFILE)
            .unwrap()
            .unwrap();
        assert_eq!(default_row["CpuWarningPercent"], 95);
    }

    #[test]
    fn save_without_data_activates_stored_profile() {
        let (module, store) = module(ModuleId::Ram);
        store
            .save_module_config(
                ModuleId::Ram,
                "night",
                &json!({"Profile": "night", "RamWarningPercent": 60}),
            )
            .unwrap();
        module.save_config(None, "night").unwrap();
        let config: Value = serde_json::from_slice(&module.config_json()).unwrap();
        assert_eq!(config["RamWarningPercent"], 60);
    }

    #[test]
    fn activating_unknown_profile_seeds_defaults() {
        let (module, store) = module(ModuleId::Disk);
        module.check_profile("fresh").unwrap();
        assert!(store.load_module_config(ModuleId::Disk, "fresh").unwrap().is_none());
        module.save_config(None, "fresh").unwrap();
        let row = store.load_module_config(ModuleId::Disk, "fresh").unwrap().unwrap();
        assert_eq!(row["Profile"], "fresh");
    }

    #[test]
    fn invalid_payload_leaves_current_config_untouched() {
        let (module, _store) = module(ModuleId::Ram);
        let before = module.current_config();
        let err = module
            .save_config(Some(br#"{"RamWarningPercent":250}"#), DEFAULT_PROFILE)
            .unwrap_err();
        assert_eq!(err.code(), "HM-2103");
        let err = module.save_config(Some(b"{oops"), DEFAULT_PROFILE).unwrap_err();
        assert_eq!(err.code(), "HM-2103");
        assert_eq!(module.current_config(), before);
    }

    #[test]
    fn corrupt_stored_row_fails_the_dry_run() {
        let (module, store) = module(ModuleId::Cpu);
        store
            .save_module_config(ModuleId::Cpu, "broken", &json!({"CpuWarningPercent": "high"}))
            .unwrap();
        assert!(module.check_profile("broken").is_err());
    }
}
