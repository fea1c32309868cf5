//! Per-module worker threads and the probes they tick.
//!
//! A worker samples its probe every tick and writes the reading to the
//! module's [`StatusBoard`]. Readings come from procfs where available; on
//! other platforms the probe reports `available: false` instead of failing.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::control::hooks::WatchList;
use crate::control::module_id::ModuleId;
use crate::core::errors::{HmError, Result};
use crate::modules::StatusBoard;
use crate::modules::settings::{CpuConfig, DiskConfig, LiveConfig, RamConfig, TargetConfig};

/// One sample of module-specific readings.
pub trait Probe: Send {
    fn sample(&mut self) -> Value;
}

/// Build the probe for `id` from its active configuration.
#[must_use]
pub fn probe_for(id: ModuleId, config: &Value, watch: &WatchList) -> Box<dyn Probe> {
    match id {
        ModuleId::Live => Box::new(LiveProbe(typed(config))),
        ModuleId::Target => Box::new(TargetProbe {
            config: typed(config),
            watch: Arc::clone(watch),
        }),
        ModuleId::Disk => Box::new(DiskProbe(typed(config))),
        ModuleId::Ram => Box::new(RamProbe(typed(config))),
        ModuleId::Cpu => Box::new(CpuProbe(typed(config))),
        ModuleId::Notify => Box::new(IdleProbe),
    }
}

fn typed<T: DeserializeOwned + Default>(config: &Value) -> T {
    serde_json::from_value(config.clone()).unwrap_or_default()
}

struct IdleProbe;

impl Probe for IdleProbe {
    fn sample(&mut self) -> Value {
        Value::Null
    }
}

struct LiveProbe(LiveConfig);

impl Probe for LiveProbe {
    fn sample(&mut self) -> Value {
        json!({
            "PingAddress": self.0.ping_address,
            "FailureThreshold": self.0.failure_threshold,
        })
    }
}

struct TargetProbe {
    config: TargetConfig,
    watch: WatchList,
}

impl Probe for TargetProbe {
    fn sample(&mut self) -> Value {
        let mut wanted = self.config.processes.clone();
        for name in self.watch.read().iter() {
            if !wanted.contains(name) {
                wanted.push(name.clone());
            }
        }
        let running = running_process_names();
        let missing: Vec<&String> = wanted
            .iter()
            .filter(|name| running.as_ref().is_some_and(|r| !r.contains(*name)))
            .collect();
        json!({
            "Watched": wanted,
            "Missing": missing,
            "Available": running.is_some(),
        })
    }
}

struct DiskProbe(DiskConfig);

impl Probe for DiskProbe {
    fn sample(&mut self) -> Value {
        let dirs: Vec<Value> = self
            .0
            .watched_dirs
            .iter()
            .map(|dir| json!({ "Path": dir, "Present": Path::new(dir).is_dir() }))
            .collect();
        json!({
            "Dirs": dirs,
            "SpaceWarningPercent": self.0.space_warning_percent,
            "InodeWarningPercent": self.0.inode_warning_percent,
        })
    }
}

struct RamProbe(RamConfig);

impl Probe for RamProbe {
    fn sample(&mut self) -> Value {
        match fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|raw| ram_used_percent(&raw))
        {
            Some(used) => json!({
                "UsedPercent": used,
                "Warning": used >= f64::from(self.0.ram_warning_percent),
                "Available": true,
            }),
            None => json!({ "Available": false }),
        }
    }
}

struct CpuProbe(CpuConfig);

impl Probe for CpuProbe {
    fn sample(&mut self) -> Value {
        let cores = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        match fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|raw| load_percent(&raw, cores))
        {
            Some(load) => json!({
                "LoadPercent": load,
                "Warning": load >= f64::from(self.0.cpu_warning_percent),
                "Available": true,
            }),
            None => json!({ "Available": false }),
        }
    }
}

/// Used memory as a percentage, from `/proc/meminfo` text.
pub(crate) fn ram_used_percent(meminfo: &str) -> Option<f64> {
    let field = |key: &str| {
        meminfo
            .lines()
            .find(|line| line.starts_with(key))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let used = (total.saturating_sub(available)) as f64 / total as f64 * 100.0;
    Some(used)
}

/// One-minute load average relative to core count, as a percentage.
pub(crate) fn load_percent(loadavg: &str, cores: usize) -> Option<f64> {
    let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    #[allow(clippy::cast_precision_loss)]
    Some(one_minute / cores.max(1) as f64 * 100.0)
}

fn running_process_names() -> Option<Vec<String>> {
    let entries = fs::read_dir("/proc").ok()?;
    let names = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|entry| fs::read_to_string(entry.path().join("comm")).ok())
        .map(|comm| comm.trim_end().to_string())
        .collect();
    Some(names)
}

/// A running worker thread. Dropping the stop sender ends it.
#[derive(Debug)]
pub struct Worker {
    id: ModuleId,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn a worker that samples `probe` every `tick`.
    pub fn spawn(
        id: ModuleId,
        board: Arc<StatusBoard>,
        mut probe: Box<dyn Probe>,
        tick: Duration,
    ) -> Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(format!("hmon-{id}"))
            .spawn(move || {
                board.record_tick(Some(probe.sample()));
                loop {
                    match stopped.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => board.record_tick(Some(probe.sample())),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| HmError::Runtime {
                details: format!("failed to spawn {id} worker: {e}"),
            })?;
        Ok(Self { id, stop, handle })
    }

    #[must_use]
    pub const fn id(&self) -> ModuleId {
        self.id
    }

    /// Stop the thread and wait for it.
    pub fn stop(self) {
        let _ = self.stop.try_send(());
        drop(self.stop);
        if self.handle.join().is_err() {
            eprintln!("[hmon] {} worker panicked", self.id);
        }
    }
}
