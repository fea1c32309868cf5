//! Module control plane: registry, desired/actual state, Signal bus, profile
//! switching, and the facade transports call into.

pub mod hooks;
pub mod module_id;
pub mod plane;
pub mod profile;
pub mod registry;
pub mod signal;
pub mod state;

pub use module_id::{ModuleId, SignalTarget};
pub use plane::ControlPlane;
pub use profile::{ProfilePhase, ProfileStatus};
pub use registry::{ModuleCapability, ModuleRegistry};
pub use signal::{Signal, SignalReceiver, SignalSender, signal_bus};
pub use state::{DesiredState, StateTracker};
