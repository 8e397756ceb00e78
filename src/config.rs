use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Launchd label for the watchdog LaunchAgent.
pub const SERVICE_LABEL: &str = "com.user.sourcesound-restart";

/// SoundSource's trial build injects noise into the audio path after roughly
/// three hours of continuous runtime. The restart threshold sits well below
/// that, and the margin absorbs several missed probe intervals: even if
/// launchd skips a few 5-minute slots (sleep, login races), the restart still
/// lands long before the trigger.
pub const TRIAL_NOISE_TRIGGER: Duration = Duration::from_secs(180 * 60);

/// Uptime at which a running SoundSource is proactively restarted.
/// Fixed for the lifetime of the binary; deliberately not a config field.
pub const RESTART_THRESHOLD: Duration = Duration::from_secs(150 * 60);

/// Seconds between launchd invocations of `sourcesound-restart run`,
/// written into the LaunchAgent plist as StartInterval.
pub const START_INTERVAL_SECS: u64 = 300;

// Probe cycles are periodic, not continuous: the restart must land before
// the trigger even when the threshold is crossed just after a pass.
const _: () = assert!(
    RESTART_THRESHOLD.as_secs() + START_INTERVAL_SECS < TRIAL_NOISE_TRIGGER.as_secs()
);

/// Top-level configuration, optionally loaded from
/// `~/.config/sourcesound-restart/config.toml`. Every field has a default;
/// the file is never required.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub restart: RestartConfig,
    pub logging: LoggingConfig,
}

/// Identity of the target application.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Executable name as it appears in the process table (pgrep -x) and
    /// application name as understood by `open -a`.
    pub name: String,
}

/// Termination sequencing knobs for the restart itself.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestartConfig {
    /// How long to wait for a graceful exit before escalating to SIGKILL.
    pub terminate_timeout_secs: u64,
    /// Polling interval while waiting for the process to exit.
    pub terminate_poll_ms: u64,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log size cap; at the start of a pass a larger log is rotated to `.old`.
    pub max_log_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "SoundSource".to_string(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            terminate_timeout_secs: 10,
            terminate_poll_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_log_bytes: 512 * 1024,
        }
    }
}

impl RestartConfig {
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }

    pub fn terminate_poll(&self) -> Duration {
        Duration::from_millis(self.terminate_poll_ms)
    }
}

impl Config {
    /// Load from the given path, falling back to defaults if the file does
    /// not exist. A present-but-malformed file is an error: silently running
    /// with defaults would mask an operator typo.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors from config loading.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}
