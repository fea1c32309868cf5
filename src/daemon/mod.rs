//! Daemon subsystem: scheduler loop, module workers, OS signal handling.

pub mod scheduler;
pub mod signals;
pub mod worker;

use std::sync::Arc;

use crate::core::config::Deployment;
use crate::core::errors::{HmError, Result};
use crate::runtime::Runtime;

pub use scheduler::{Scheduler, SchedulerTiming};
pub use signals::SignalFlags;

/// Run the scheduler in the foreground until SIGINT/SIGTERM.
pub fn run(runtime: Runtime, flags: &SignalFlags) -> Result<()> {
    if runtime.config.control.deployment != Deployment::Standalone {
        return Err(HmError::InvalidConfig {
            details: "the daemon requires control.deployment = \"standalone\"".to_string(),
        });
    }
    let actual = runtime.actual_writer().ok_or_else(|| HmError::Runtime {
        details: "standalone runtime without an actual-state writer".to_string(),
    })?;

    let Runtime {
        config,
        store,
        plane,
        signals,
        boards,
        watch,
        logger,
        ..
    } = runtime;

    let mut scheduler = Scheduler::new(
        Arc::clone(&plane),
        store,
        actual,
        boards,
        watch,
        logger,
        SchedulerTiming::with_tick(config.modules.tick_interval()),
    )
    .with_status_file(config.paths.status_file.clone());
    scheduler.start_desired()?;
    scheduler.run(&signals, flags)
}
