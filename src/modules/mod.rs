//! Built-in module collaborators: typed settings, status boards, and the
//! store-backed capability every module id is registered with.

pub mod settings;
pub mod status;
pub mod stored;

use std::sync::Arc;

use crate::control::module_id::{MODULE_COUNT, ModuleId};
use crate::control::registry::ModuleRegistry;
use crate::core::errors::Result;
use crate::store::ConfigStore;

pub use status::{ModuleStatus, StatusBoard};
pub use stored::StoredModule;

/// Registry plus the status boards the scheduler's workers write to.
pub struct BuiltinModules {
    pub registry: ModuleRegistry,
    boards: [Option<Arc<StatusBoard>>; MODULE_COUNT],
}

impl BuiltinModules {
    /// Register a [`StoredModule`] for each id in `ids`, loaded for `profile`.
    pub fn build(store: &Arc<dyn ConfigStore>, ids: &[ModuleId], profile: &str) -> Result<Self> {
        let mut builder = ModuleRegistry::builder();
        let mut boards: [Option<Arc<StatusBoard>>; MODULE_COUNT] = Default::default();
        for &id in ids {
            let module = StoredModule::load(id, Arc::clone(store), profile)?;
            boards[id.index()] = Some(module.status_board());
            builder = builder.register(id, Arc::new(module))?;
        }
        Ok(Self {
            registry: builder.build(),
            boards,
        })
    }

    #[must_use]
    pub fn board(&self, id: ModuleId) -> Option<Arc<StatusBoard>> {
        self.boards[id.index()].clone()
    }

    /// Split into the registry and a board lookup the scheduler can own.
    #[must_use]
    pub fn into_parts(self) -> (ModuleRegistry, StatusBoards) {
        (self.registry, StatusBoards(self.boards))
    }
}

/// Status boards by module id.
#[derive(Debug, Clone, Default)]
pub struct StatusBoards([Option<Arc<StatusBoard>>; MODULE_COUNT]);

impl StatusBoards {
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Arc<StatusBoard>> {
        self.0[id.index()].as_ref()
    }
}
