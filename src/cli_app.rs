//! Top-level CLI definition and dispatch.

use std::io::{self, Read as _};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use crate::cli::init::{InitOptions, format_init_report, run_init_sequence};
use crate::control::module_id::ModuleId;
use crate::control::plane::ControlPlane;
use crate::control::signal::Signal;
use crate::core::config::Config;
use crate::core::errors::{HmError, Result};
use crate::daemon::{self, SignalFlags};
use crate::runtime::Runtime;

/// Health monitor: control plane and daemon for host-monitoring modules.
#[derive(Debug, Parser)]
#[command(name = "hmon", version, about)]
pub struct Cli {
    /// Config file (defaults to $HMON_CONFIG, then ~/.health_monitor/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Print machine-readable JSON instead of human output.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the home directory, write the config file, and seed the database.
    Init {
        /// Show the plan without touching disk.
        #[arg(long)]
        dry_run: bool,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Run the scheduler in the foreground.
    Daemon,
    /// Show a module's status.
    Status { module: String },
    /// Show a module's active configuration.
    Config { module: String },
    /// Save a module's configuration from a JSON file, or `-` for stdin.
    SaveConfig { module: String, source: String },
    /// Enable a module.
    Enable { module: String },
    /// Disable a module.
    Disable { module: String },
    /// List stored profiles.
    Profiles,
    /// Switch every module to a stored profile.
    Profile { name: String },
    /// Show the active profile and whether the last switch completed.
    ActiveProfile,
    /// Generate shell completions.
    Completions { shell: Shell },
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Init { dry_run, force } => {
            let config = Config::load(cli.config.as_deref()).or_else(|err| match err {
                HmError::MissingConfig { path } => {
                    let mut config = Config::default();
                    config.paths.config_file = path;
                    Ok(config)
                }
                other => Err(other),
            })?;
            let report = run_init_sequence(&InitOptions {
                config,
                force: *force,
                dry_run: *dry_run,
            });
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{}", format_init_report(&report));
            }
            if report.success {
                Ok(())
            } else {
                Err(HmError::Runtime {
                    details: "init did not complete".to_string(),
                })
            }
        }
        Command::Daemon => {
            let runtime = open_runtime(cli)?;
            let flags = SignalFlags::new();
            flags.install()?;
            if !cli.json {
                println!(
                    "{} daemon running with profile {}",
                    "hmon".bold(),
                    runtime.plane.active_profile().cyan()
                );
            }
            daemon::run(runtime, &flags)
        }
        Command::Status { module } => {
            let runtime = open_runtime(cli)?;
            let local: Value = serde_json::from_slice(&runtime.plane.get_status_json(module)?)?;
            let status = published_status(&runtime.config.paths.status_file, module).unwrap_or(local);
            if cli.json {
                print_json(&status)
            } else {
                print_status(&runtime.plane, module, &status);
                Ok(())
            }
        }
        Command::Config { module } => {
            let runtime = open_runtime(cli)?;
            let config: Value = serde_json::from_slice(&runtime.plane.get_config_json(module)?)?;
            if cli.json {
                print_json(&config)
            } else {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        }
        Command::SaveConfig { module, source } => {
            let data = read_source(source)?;
            let runtime = open_runtime(cli)?;
            let before = runtime.plane.active_profile();
            let result = runtime.plane.save_config(module, &data);
            report_mutation(cli, &runtime, result)?;
            let after = runtime.plane.active_profile();
            if !cli.json && before != after {
                println!("active profile: {} -> {}", before.dimmed(), after.cyan());
            }
            Ok(())
        }
        Command::Enable { module } => {
            let runtime = open_runtime(cli)?;
            let result = runtime.plane.set_module_enabled(module, true);
            report_mutation(cli, &runtime, result)
        }
        Command::Disable { module } => {
            let runtime = open_runtime(cli)?;
            let result = runtime.plane.set_module_enabled(module, false);
            report_mutation(cli, &runtime, result)
        }
        Command::Profiles => {
            let runtime = open_runtime(cli)?;
            let profiles = runtime.plane.list_profiles()?;
            if cli.json {
                return print_json(&profiles);
            }
            let active = runtime.plane.active_profile();
            for name in profiles {
                if name == active {
                    println!("{} {}", "*".green(), name.bold());
                } else {
                    println!("  {name}");
                }
            }
            Ok(())
        }
        Command::Profile { name } => {
            let runtime = open_runtime(cli)?;
            let result = runtime.plane.load_profile(name);
            report_mutation(cli, &runtime, result)
        }
        Command::ActiveProfile => {
            let runtime = open_runtime(cli)?;
            let status = runtime.plane.profile_status();
            if cli.json {
                return print_json(&status);
            }
            println!("{}", status.active.bold());
            if !status.is_consistent() {
                println!("{} {:?}", "warning:".yellow().bold(), status.phase);
            }
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "hmon", &mut io::stdout());
            Ok(())
        }
    }
}

fn open_runtime(cli: &Cli) -> Result<Runtime> {
    let config = Config::load(cli.config.as_deref())?;
    Runtime::open(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| HmError::io("<stdin>", e))?;
        Ok(buf)
    } else {
        std::fs::read(source).map_err(|e| HmError::io(source, e))
    }
}

/// Status the daemon last published for `module`, if any.
fn published_status(path: &Path, module: &str) -> Option<Value> {
    let id = ModuleId::canonicalize(module)?;
    let raw = std::fs::read(path).ok()?;
    let mut all: serde_json::Map<String, Value> = serde_json::from_slice(&raw).ok()?;
    all.remove(id.as_str())
}

fn print_status(plane: &ControlPlane, module: &str, status: &Value) {
    let running = status.get("Running").and_then(Value::as_bool).unwrap_or(false);
    let desired = ModuleId::canonicalize(module)
        .is_some_and(|id| plane.desired_state().modules.get(id));
    let state = if running { "running".green() } else { "stopped".red() };
    let want = if desired { "enabled" } else { "disabled" };
    println!("{} {state} ({want})", module.bold());
    if let Ok(pretty) = serde_json::to_string_pretty(status) {
        println!("{pretty}");
    }
}

#[derive(Serialize)]
struct MutationReport {
    ok: bool,
    active_profile: String,
    signals: Vec<Signal>,
    error: Option<String>,
}

/// Print queued Signals and the operation's result. Signals stay in this
/// process; a running daemon picks up the persisted state on its next sync.
fn report_mutation(cli: &Cli, runtime: &Runtime, result: Result<()>) -> Result<()> {
    let signals = runtime.signals.drain(runtime.config.control.signal_queue_capacity);
    if cli.json {
        print_json(&MutationReport {
            ok: result.is_ok(),
            active_profile: runtime.plane.active_profile(),
            signals,
            error: result.as_ref().err().map(ToString::to_string),
        })?;
    } else {
        for signal in &signals {
            println!("{} {signal}", "signal".dimmed());
        }
        if result.is_ok() {
            println!("{}", "ok".green());
        }
    }
    result
}
