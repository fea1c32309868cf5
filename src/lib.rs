//! Health monitor: a uniform control plane over pluggable host-monitoring
//! modules (liveness, target processes, disk, RAM, CPU, notifications).
//!
//! The [`control::ControlPlane`] is the only entry point transports use. It
//! resolves module names through the registry, records operator intent in the
//! state tracker, switches profiles across every module, and hands start/stop
//! [`control::Signal`]s to the scheduler in [`daemon`].

#![forbid(unsafe_code)]

pub mod control;
pub mod core;
pub mod logger;
pub mod modules;
pub mod runtime;
pub mod store;

#[cfg(feature = "daemon")]
pub mod daemon;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod cli_app;

pub use crate::control::{ControlPlane, ModuleId, Signal};
pub use crate::core::config::Config;
pub use crate::core::errors::{HmError, Result};
pub use crate::runtime::Runtime;
