mod config;
mod controller;
mod lock;
mod logger;
mod paths;
mod plist;
mod policy;
mod probe;
mod service;
mod watchdog;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use config::{Config, SERVICE_LABEL, START_INTERVAL_SECS};
use lock::{InstanceLock, LockAttempt};
use paths::ConfigDir;
use probe::ProcessProbe;
use service::{Launchctl, ServiceRegistrar};

/// Keeps SoundSource restarted before its trial-mode noise timer fires.
///
/// `install` registers a LaunchAgent that invokes `run` on an interval; the
/// other verbs manage that registration.
#[derive(Parser, Debug)]
#[command(name = "sourcesound-restart", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the watchdog LaunchAgent with launchd
    Install,
    /// Unregister the LaunchAgent and remove its descriptor
    Uninstall,
    /// Report service registration state and the target app's state
    Status {
        /// Machine-readable JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Re-register the LaunchAgent with the current install path
    Reload,
    /// Run one watchdog pass (invoked periodically by launchd)
    Run,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Run => run_pass().await,
        Command::Install => operator_verb(handle_install()),
        Command::Uninstall => operator_verb(handle_uninstall()),
        Command::Reload => operator_verb(handle_reload()),
        Command::Status { json } => operator_verb(handle_status(json).await),
    };

    std::process::exit(exit_code);
}

/// Operator verbs print their outcome and map errors to exit code 1.
fn operator_verb(result: Result<String, String>) -> i32 {
    match result {
        Ok(message) => {
            println!("{message}");
            0
        }
        Err(message) => {
            eprintln!("Error: {message}");
            1
        }
    }
}

fn build_registrar(config_dir: &ConfigDir) -> Result<ServiceRegistrar<Launchctl>, String> {
    let plist_path = service::launch_agents_plist(SERVICE_LABEL).map_err(|e| e.to_string())?;
    Ok(ServiceRegistrar::new(
        SERVICE_LABEL,
        plist_path,
        config_dir.log(),
        START_INTERVAL_SECS,
        Launchctl::new(SERVICE_LABEL),
    ))
}

fn handle_install() -> Result<String, String> {
    logger::init_stderr();
    let config_dir = ConfigDir::resolve().map_err(|e| e.to_string())?;
    // The log directory must exist before launchd tries to redirect into it.
    config_dir.init().map_err(|e| e.to_string())?;

    let registrar = build_registrar(&config_dir)?;
    let stable = paths::stable_invocation_path().map_err(|e| e.to_string())?;
    registrar.install(&stable).map_err(|e| e.to_string())?;

    Ok(format!(
        "Installed {SERVICE_LABEL}; watchdog runs every {} minutes.\nLog: {}",
        START_INTERVAL_SECS / 60,
        config_dir.log().display()
    ))
}

fn handle_uninstall() -> Result<String, String> {
    logger::init_stderr();
    let config_dir = ConfigDir::resolve().map_err(|e| e.to_string())?;
    let registrar = build_registrar(&config_dir)?;
    registrar.uninstall().map_err(|e| e.to_string())?;

    // Logs are left behind on purpose; they persist until removed by hand.
    Ok(format!("Uninstalled {SERVICE_LABEL}."))
}

fn handle_reload() -> Result<String, String> {
    logger::init_stderr();
    let config_dir = ConfigDir::resolve().map_err(|e| e.to_string())?;
    config_dir.init().map_err(|e| e.to_string())?;

    let registrar = build_registrar(&config_dir)?;
    let stable = paths::stable_invocation_path().map_err(|e| e.to_string())?;
    registrar.reload(&stable).map_err(|e| e.to_string())?;

    Ok(format!("Reloaded {SERVICE_LABEL}."))
}

/// Snapshot of everything `status` reports.
#[derive(Debug, Serialize)]
struct StatusReport {
    service: service::ServiceState,
    app_name: String,
    app_running: bool,
    app_pid: Option<i32>,
    app_uptime_secs: Option<u64>,
    checked_at: DateTime<Utc>,
}

async fn handle_status(json: bool) -> Result<String, String> {
    logger::init_stderr();
    let config_dir = ConfigDir::resolve().map_err(|e| e.to_string())?;
    let config = Config::load(&config_dir.config()).map_err(|e| e.to_string())?;
    let registrar = build_registrar(&config_dir)?;

    let snapshot = ProcessProbe::new(&config.app.name).snapshot().await;
    let report = StatusReport {
        service: registrar.status(),
        app_name: config.app.name,
        app_running: snapshot.running,
        app_pid: snapshot.pid,
        app_uptime_secs: snapshot.uptime.map(|u| u.as_secs()),
        checked_at: Utc::now(),
    };

    if json {
        return serde_json::to_string_pretty(&report).map_err(|e| e.to_string());
    }

    let app_line = if report.app_running {
        format!(
            "{} is running (pid {}, up {} min)",
            report.app_name,
            report.app_pid.unwrap_or(0),
            report.app_uptime_secs.unwrap_or(0) / 60
        )
    } else {
        format!("{} is not running", report.app_name)
    };
    Ok(format!("Service: {}\n{app_line}", report.service))
}

/// One periodic pass. Only setup failures produce a non-zero exit; everything
/// past that point is logged and swallowed so launchd never sees a
/// crash-looping job.
async fn run_pass() -> i32 {
    let config_dir = match ConfigDir::resolve() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    if let Err(e) = config_dir.init() {
        eprintln!("Error: failed to create {}: {e}", config_dir.root().display());
        return 1;
    }

    let config = match Config::load(&config_dir.config()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    if let Err(e) = logger::init_file(&config_dir, config.logging.max_log_bytes) {
        eprintln!("Error: failed to open log: {e}");
        return 1;
    }

    // Overlapping passes must never issue conflicting actions on the target.
    let _lock = match InstanceLock::try_acquire(&config_dir.lock()) {
        Ok(LockAttempt::Acquired(lock)) => lock,
        Ok(LockAttempt::Busy) => {
            tracing::info!("another pass holds the lock, exiting");
            return 0;
        }
        Err(e) => {
            tracing::error!(error = %e, "could not open the lock file");
            return 0;
        }
    };

    watchdog::run_pass(&config).await;
    0
}
