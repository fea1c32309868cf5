//! Fan-out logger: every sink gets every record until it fails once; after
//! that the sink is disabled and the rest keep going. With no healthy sink
//! left, records fall back to stderr.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::jsonl::JsonlLogger;
use super::{ActivityEvent, ActivityLogger, ActivityRecord, ActivitySink};

struct SinkSlot {
    sink: Box<dyn ActivitySink>,
    healthy: AtomicBool,
}

pub struct DualLogger {
    slots: Vec<SinkSlot>,
}

impl DualLogger {
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn ActivitySink>>) -> Self {
        Self {
            slots: sinks
                .into_iter()
                .map(|sink| SinkSlot {
                    sink,
                    healthy: AtomicBool::new(true),
                })
                .collect(),
        }
    }

    /// Open the JSONL log and, with the `sqlite` feature, the `activity_log`
    /// table in `db_path`. A sink that cannot be opened is left out.
    #[must_use]
    pub fn open(jsonl_path: &Path, db_path: &Path) -> Self {
        let mut sinks: Vec<Box<dyn ActivitySink>> = Vec::new();
        match JsonlLogger::open(jsonl_path) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => eprintln!("[hmon] activity jsonl sink disabled: {e}"),
        }
        #[cfg(feature = "sqlite")]
        match super::sqlite::SqliteLogger::open(db_path) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => eprintln!("[hmon] activity sqlite sink disabled: {e}"),
        }
        #[cfg(not(feature = "sqlite"))]
        let _ = db_path;
        Self::new(sinks)
    }

    /// Names of sinks that are still accepting records.
    #[must_use]
    pub fn healthy_sinks(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| slot.healthy.load(Ordering::Relaxed))
            .map(|slot| slot.sink.name())
            .collect()
    }
}

impl std::fmt::Debug for DualLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualLogger")
            .field("healthy", &self.healthy_sinks())
            .finish()
    }
}

impl ActivityLogger for DualLogger {
    fn log(&self, event: ActivityEvent) {
        let record = ActivityRecord::now(event);
        let mut delivered = false;
        for slot in &self.slots {
            if !slot.healthy.load(Ordering::Relaxed) {
                continue;
            }
            match slot.sink.write(&record) {
                Ok(()) => delivered = true,
                Err(err) => {
                    slot.healthy.store(false, Ordering::Relaxed);
                    eprintln!(
                        "[hmon] activity sink {} disabled after error: {err}",
                        slot.sink.name()
                    );
                }
            }
        }
        if !delivered {
            match serde_json::to_string(&record) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => eprintln!("{record:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{HmError, Result};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FlakySink {
        name: &'static str,
        fail: bool,
        seen: Arc<Mutex<usize>>,
    }

    impl ActivitySink for FlakySink {
        fn name(&self) -> &'static str {
            self.name
        }

        fn write(&self, _record: &ActivityRecord) -> Result<()> {
            if self.fail {
                return Err(HmError::Runtime {
                    details: "disk full".to_string(),
                });
            }
            *self.seen.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn failing_sink_is_disabled_and_other_keeps_logging() {
        let good = Arc::new(Mutex::new(0));
        let logger = DualLogger::new(vec![
            Box::new(FlakySink {
                name: "jsonl",
                fail: true,
                seen: Arc::new(Mutex::new(0)),
            }),
            Box::new(FlakySink {
                name: "sqlite",
                fail: false,
                seen: Arc::clone(&good),
            }),
        ]);
        logger.log(ActivityEvent::SchedulerStarted);
        logger.log(ActivityEvent::SchedulerStopped);
        assert_eq!(*good.lock(), 2);
        assert_eq!(logger.healthy_sinks(), vec!["sqlite"]);
    }

    #[test]
    fn no_sinks_falls_back_without_panicking() {
        let logger = DualLogger::new(Vec::new());
        logger.log(ActivityEvent::SchedulerStarted);
        assert!(logger.healthy_sinks().is_empty());
    }
}
