//! Persistence collaborator: per-module configuration rows keyed by profile,
//! plus the durable desired state and profile phase.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use serde_json::Value;

use crate::control::module_id::ModuleId;
use crate::control::profile::ProfilePhase;
use crate::control::state::DesiredState;
use crate::core::errors::Result;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Storage contract used by modules and the control plane. Errors are
/// surfaced verbatim to callers as persistence failures.
pub trait ConfigStore: Send + Sync {
    /// Every profile that has at least one stored row, sorted and unique.
    fn list_profiles(&self) -> Result<Vec<String>>;

    fn load_module_config(&self, module: ModuleId, profile: &str) -> Result<Option<Value>>;

    /// Insert or replace the row for (`module`, `profile`).
    fn save_module_config(&self, module: ModuleId, profile: &str, config: &Value) -> Result<()>;

    fn load_desired_state(&self) -> Result<Option<DesiredState>>;

    fn save_desired_state(&self, state: &DesiredState) -> Result<()>;

    /// Last recorded profile phase; `None` before the first switch or load.
    fn load_profile_phase(&self) -> Result<Option<ProfilePhase>>;

    fn save_profile_phase(&self, phase: &ProfilePhase) -> Result<()>;
}
