//! In-memory store for tests and embedding hosts that persist elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde_json::Value;

use super::ConfigStore;
use crate::control::module_id::ModuleId;
use crate::control::profile::ProfilePhase;
use crate::control::state::{DEFAULT_PROFILE, DesiredState};
use crate::core::errors::Result;
use crate::modules::settings;

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<(ModuleId, String), Value>>,
    desired: RwLock<Option<DesiredState>>,
    phase: RwLock<Option<ProfilePhase>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding every module's defaults under the default profile.
    #[must_use]
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.write();
            for id in ModuleId::ALL {
                rows.insert(
                    (id, DEFAULT_PROFILE.to_string()),
                    settings::default_config(id, DEFAULT_PROFILE),
                );
            }
        }
        store
    }
}

impl ConfigStore for MemoryStore {
    fn list_profiles(&self) -> Result<Vec<String>> {
        let profiles: BTreeSet<String> = self
            .rows
            .read()
            .keys()
            .map(|(_, profile)| profile.clone())
            .collect();
        Ok(profiles.into_iter().collect())
    }

    fn load_module_config(&self, module: ModuleId, profile: &str) -> Result<Option<Value>> {
        Ok(self
            .rows
            .read()
            .get(&(module, profile.to_string()))
            .cloned())
    }

    fn save_module_config(&self, module: ModuleId, profile: &str, config: &Value) -> Result<()> {
        self.rows
            .write()
            .insert((module, profile.to_string()), config.clone());
        Ok(())
    }

    fn load_desired_state(&self) -> Result<Option<DesiredState>> {
        Ok(self.desired.read().clone())
    }

    fn save_desired_state(&self, state: &DesiredState) -> Result<()> {
        *self.desired.write() = Some(state.clone());
        Ok(())
    }

    fn load_profile_phase(&self) -> Result<Option<ProfilePhase>> {
        Ok(self.phase.read().clone())
    }

    fn save_profile_phase(&self, phase: &ProfilePhase) -> Result<()> {
        *self.phase.write() = Some(phase.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profiles_are_sorted_and_unique() {
        let store = MemoryStore::seeded();
        store
            .save_module_config(ModuleId::Cpu, "night", &json!({"Profile": "night"}))
            .unwrap();
        store
            .save_module_config(ModuleId::Ram, "audit", &json!({"Profile": "audit"}))
            .unwrap();
        store
            .save_module_config(ModuleId::Disk, "night", &json!({"Profile": "night"}))
            .unwrap();
        assert_eq!(
            store.list_profiles().unwrap(),
            vec!["audit".to_string(), "default".to_string(), "night".to_string()]
        );
    }

    #[test]
    fn seeded_store_has_every_module() {
        let store = MemoryStore::seeded();
        for id in ModuleId::ALL {
            assert!(store.load_module_config(id, DEFAULT_PROFILE).unwrap().is_some());
        }
        assert!(store.load_desired_state().unwrap().is_none());
    }
}
