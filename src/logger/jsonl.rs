//! Append-only JSONL activity log.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{ActivityEvent, ActivityLogger, ActivityRecord, ActivitySink};
use crate::core::errors::{HmError, Result};

/// One JSON object per line, flushed after every record.
#[derive(Debug)]
pub struct JsonlLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlLogger {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HmError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HmError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ActivitySink for JsonlLogger {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write(&self, record: &ActivityRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|e| HmError::io(&self.path, e))
    }
}

impl ActivityLogger for JsonlLogger {
    fn log(&self, event: ActivityEvent) {
        if let Err(err) = self.write(&ActivityRecord::now(event)) {
            eprintln!("[hmon] activity log write failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::module_id::ModuleId;
    use tempfile::TempDir;

    #[test]
    fn appends_one_line_per_event() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("activity.jsonl");
        let logger = JsonlLogger::open(&path).unwrap();
        logger.log(ActivityEvent::ModuleToggled {
            module: ModuleId::Ram,
            enabled: false,
        });
        logger.log(ActivityEvent::ProfileLoaded {
            profile: "night".to_string(),
        });

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ActivityRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first.event,
            ActivityEvent::ModuleToggled {
                module: ModuleId::Ram,
                enabled: false
            }
        );
        assert!(lines[1].contains("\"event\":\"profile_loaded\""));
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("activity.jsonl");
        JsonlLogger::open(&path)
            .unwrap()
            .log(ActivityEvent::SchedulerStarted);
        JsonlLogger::open(&path)
            .unwrap()
            .log(ActivityEvent::SchedulerStopped);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
