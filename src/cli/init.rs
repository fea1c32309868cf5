//! First-run setup for `hmon init`.
//!
//! Creates the home directory, writes the config file, and opens (and so
//! seeds) the module database with every module's defaults under the
//! `default` profile. `--dry-run` reports the plan without touching disk.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{HmError, Result};
use crate::store::{ConfigStore, SqliteStore};

/// A single step in the init sequence.
#[derive(Debug, Clone, Serialize)]
pub struct InitStep {
    pub description: String,
    pub done: bool,
    pub error: Option<String>,
}

/// Structured report from an init run.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub steps: Vec<InitStep>,
    pub success: bool,
    pub home_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub db_file: Option<PathBuf>,
    /// Profiles present in the database after seeding.
    pub profiles: Vec<String>,
    pub dry_run: bool,
}

impl InitReport {
    fn new(dry_run: bool) -> Self {
        Self {
            steps: Vec::new(),
            success: false,
            home_dir: None,
            config_path: None,
            db_file: None,
            profiles: Vec::new(),
            dry_run,
        }
    }

    fn step_ok(&mut self, description: impl Into<String>) {
        self.steps.push(InitStep {
            description: description.into(),
            done: true,
            error: None,
        });
    }

    fn step_fail(&mut self, description: impl Into<String>, error: impl Into<String>) {
        self.steps.push(InitStep {
            description: description.into(),
            done: false,
            error: Some(error.into()),
        });
    }

    fn step_plan(&mut self, description: impl Into<String>) {
        self.steps.push(InitStep {
            description: description.into(),
            done: false,
            error: None,
        });
    }

    fn finish(mut self) -> Self {
        self.success = self.steps.iter().all(|s| s.error.is_none());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub config: Config,
    /// Replace an existing config file.
    pub force: bool,
    pub dry_run: bool,
}

/// Run the init sequence. Stops at the first failed step.
pub fn run_init_sequence(opts: &InitOptions) -> InitReport {
    let mut report = InitReport::new(opts.dry_run);
    let paths = &opts.config.paths;

    let home = &paths.home_dir;
    if opts.dry_run {
        report.step_plan(format!("Create home directory: {}", home.display()));
    } else {
        match std::fs::create_dir_all(home) {
            Ok(()) => {
                report.step_ok(format!("Created home directory: {}", home.display()));
                report.home_dir = Some(home.clone());
            }
            Err(e) => {
                report.step_fail(
                    format!("Create home directory: {}", home.display()),
                    e.to_string(),
                );
                return report.finish();
            }
        }
    }

    let config_path = &paths.config_file;
    if opts.dry_run {
        report.step_plan(format!("Write config: {}", config_path.display()));
    } else if config_path.exists() && !opts.force {
        report.step_ok(format!("Kept existing config: {}", config_path.display()));
        report.config_path = Some(config_path.clone());
    } else {
        match write_config(&opts.config, config_path) {
            Ok(()) => {
                report.step_ok(format!("Wrote config: {}", config_path.display()));
                report.config_path = Some(config_path.clone());
            }
            Err(e) => {
                report.step_fail(
                    format!("Write config: {}", config_path.display()),
                    e.to_string(),
                );
                return report.finish();
            }
        }
    }

    let db_file = &paths.db_file;
    if opts.dry_run {
        report.step_plan(format!(
            "Seed module database with default profile: {}",
            db_file.display()
        ));
    } else {
        match seed_database(db_file) {
            Ok(profiles) => {
                report.step_ok(format!(
                    "Seeded module database: {} ({} profile(s))",
                    db_file.display(),
                    profiles.len()
                ));
                report.db_file = Some(db_file.clone());
                report.profiles = profiles;
            }
            Err(e) => {
                report.step_fail(
                    format!("Seed module database: {}", db_file.display()),
                    e.to_string(),
                );
            }
        }
    }

    report.finish()
}

fn write_config(config: &Config, path: &Path) -> Result<()> {
    let raw = config.to_toml()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HmError::io(parent, e))?;
    }
    std::fs::write(path, raw).map_err(|e| HmError::io(path, e))
}

/// Open the store (seeding an empty database) and record the initial
/// desired state when none exists yet.
fn seed_database(db_file: &Path) -> Result<Vec<String>> {
    let store = SqliteStore::open(db_file)?;
    if store.load_desired_state()?.is_none() {
        store.save_desired_state(&crate::control::state::DesiredState::default())?;
    }
    store.list_profiles()
}

/// Format an init report for terminal output.
#[must_use]
pub fn format_init_report(report: &InitReport) -> String {
    let mut out = String::new();

    let mode = if report.dry_run { "dry-run" } else { "init" };
    let _ = writeln!(out, "hmon {mode} report:\n");

    for step in &report.steps {
        let icon = if step.error.is_some() {
            "FAIL"
        } else if step.done {
            "DONE"
        } else {
            "PLAN"
        };
        let _ = writeln!(out, "  [{icon}] {}", step.description);
        if let Some(err) = &step.error {
            let _ = writeln!(out, "         error: {err}");
        }
    }

    if !report.dry_run && report.success {
        out.push('\n');
        if let Some(ref config) = report.config_path {
            let _ = writeln!(out, "  Config:   {}", config.display());
        }
        if let Some(ref db) = report.db_file {
            let _ = writeln!(out, "  Database: {}", db.display());
        }
        if !report.profiles.is_empty() {
            let _ = writeln!(out, "  Profiles: {}", report.profiles.join(", "));
        }
    }

    out
}
