/// Log sink for watchdog passes.
///
/// Each launchd invocation is short-lived, so rotation happens once at open:
/// if the log has outgrown its cap it is renamed to `.old` (replacing the
/// previous generation) and a fresh file is started. Within a pass all writes
/// are append-only, which keeps the file safe even if two instances somehow
/// overlap.
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::paths::ConfigDir;

/// Open the log file for appending, rotating it first if it exceeds
/// `max_bytes`. Creates the parent directory on first run.
pub fn prepare_log_file(path: &Path, old_path: &Path, max_bytes: u64) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let oversized = std::fs::metadata(path)
        .map(|m| m.len() > max_bytes)
        .unwrap_or(false);
    if oversized {
        std::fs::rename(path, old_path)?;
    }

    OpenOptions::new().append(true).create(true).open(path)
}

/// Initialize tracing for a periodic `run` pass: plain timestamped lines
/// appended to the watchdog log.
pub fn init_file(config_dir: &ConfigDir, max_bytes: u64) -> std::io::Result<()> {
    let file = prepare_log_file(&config_dir.log(), &config_dir.log_old(), max_bytes)?;
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Initialize tracing for operator verbs: stderr, so stdout stays clean for
/// the verb's own output.
pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
