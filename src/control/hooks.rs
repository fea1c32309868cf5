//! External process dependency of the `target` module.
//!
//! Enabling `target` attaches the dependency before the start Signal is sent,
//! so the scheduler can rely on it being in place; disabling detaches it
//! before the stop Signal.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::errors::Result;

pub trait DependencyHook: Send + Sync {
    fn attach(&self) -> Result<()>;
    fn detach(&self) -> Result<()>;
}

/// Hook for deployments without an external dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl DependencyHook for NoopHook {
    fn attach(&self) -> Result<()> {
        Ok(())
    }

    fn detach(&self) -> Result<()> {
        Ok(())
    }
}

/// Process the `target` module depends on.
pub const TARGET_PROCESS: &str = "owtf";

/// Shared list of process names the `target` module watches.
pub type WatchList = Arc<RwLock<Vec<String>>>;

/// Adds/removes one process name on a shared watch list.
#[derive(Debug, Clone)]
pub struct WatchListHook {
    process: String,
    list: WatchList,
}

impl WatchListHook {
    #[must_use]
    pub fn new(process: impl Into<String>, list: WatchList) -> Self {
        Self {
            process: process.into(),
            list,
        }
    }
}

impl DependencyHook for WatchListHook {
    fn attach(&self) -> Result<()> {
        let mut list = self.list.write();
        if !list.iter().any(|name| *name == self.process) {
            list.push(self.process.clone());
        }
        Ok(())
    }

    fn detach(&self) -> Result<()> {
        self.list.write().retain(|name| *name != self.process);
        Ok(())
    }
}
