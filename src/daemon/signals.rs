//! OS signal handling for the daemon loop.
//!
//! SIGINT/SIGTERM/SIGQUIT request shutdown. SIGHUP (unix) requests a reload:
//! the scheduler re-reads the persisted desired state and restarts every
//! desired module so config saved by another process takes effect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::errors::{HmError, Result};

/// Flags flipped by signal handlers and polled by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    shutdown: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl SignalFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the process signal handlers.
    pub fn install(&self) -> Result<()> {
        for &sig in signal_hook::consts::TERM_SIGNALS {
            signal_hook::flag::register(sig, Arc::clone(&self.shutdown)).map_err(|e| {
                HmError::Runtime {
                    details: format!("failed to register handler for signal {sig}: {e}"),
                }
            })?;
        }
        #[cfg(unix)]
        signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&self.reload))
            .map_err(|e| HmError::Runtime {
                details: format!("failed to register SIGHUP handler: {e}"),
            })?;
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Consume a pending reload request.
    #[must_use]
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_is_consumed_once() {
        let flags = SignalFlags::new();
        assert!(!flags.take_reload());
        flags.request_reload();
        assert!(flags.take_reload());
        assert!(!flags.take_reload());
    }

    #[test]
    fn clones_share_state() {
        let flags = SignalFlags::new();
        let other = flags.clone();
        other.request_shutdown();
        assert!(flags.shutdown_requested());
    }
}
