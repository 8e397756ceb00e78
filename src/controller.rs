/// Imperative restart actions against the target application.
///
/// Termination starts polite: SIGTERM, then a bounded wait for the process to
/// leave the table. SoundSource sits in the audio path, so it gets a chance
/// to tear down routing before the single force-kill escalation.
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::config::RestartConfig;

/// How a termination concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited on SIGTERM within the bounded wait.
    Graceful,
    /// Needed the single SIGKILL escalation.
    Forced,
}

/// Errors from the restart sequence. Callers log and let the next scheduled
/// pass retry; these are never fatal to the watchdog.
#[derive(Debug)]
pub enum RestartError {
    /// The process survived SIGTERM, the bounded wait, and the SIGKILL
    /// escalation.
    TerminateTimeout { pid: i32 },
    /// `open` could not be spawned or reported failure.
    LaunchFailed { app: String, detail: String },
}

impl std::fmt::Display for RestartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartError::TerminateTimeout { pid } => {
                write!(f, "process {pid} did not exit, even after SIGKILL")
            }
            RestartError::LaunchFailed { app, detail } => {
                write!(f, "failed to relaunch {app}: {detail}")
            }
        }
    }
}

impl std::error::Error for RestartError {}

pub struct AppController {
    app_name: String,
    terminate_timeout: Duration,
    terminate_poll: Duration,
}

impl AppController {
    pub fn new(app_name: impl Into<String>, restart: &RestartConfig) -> Self {
        Self {
            app_name: app_name.into(),
            terminate_timeout: restart.terminate_timeout(),
            terminate_poll: restart.terminate_poll(),
        }
    }

    /// Terminate the observed pid, then relaunch the application.
    pub async fn restart(&self, pid: i32) -> Result<TerminateOutcome, RestartError> {
        let outcome = self.terminate(pid).await?;
        self.launch().await?;
        Ok(outcome)
    }

    /// SIGTERM, bounded wait, at most one SIGKILL.
    pub async fn terminate(&self, pid: i32) -> Result<TerminateOutcome, RestartError> {
        let target = Pid::from_raw(pid);

        match kill(target, Signal::SIGTERM) {
            Ok(()) => { eprintln!("DBG: SIGTERM ok for {pid}"); }
            // Already gone between probe and action.
            Err(Errno::ESRCH) => { eprintln!("DBG: SIGTERM ESRCH for {pid}"); return Ok(TerminateOutcome::Graceful); }
            Err(e) => {
                tracing::warn!(pid, errno = %e, "SIGTERM delivery failed");
            }
        }

        if self.wait_for_exit(target, self.terminate_timeout).await {
            eprintln!("DBG: exited during graceful wait for {pid}");
            return Ok(TerminateOutcome::Graceful);
        }

        tracing::warn!(pid, "graceful termination timed out, escalating to SIGKILL");
        let _ = kill(target, Signal::SIGKILL);

        // SIGKILL is not negotiable, but give the kernel a moment to reap.
        if self.wait_for_exit(target, Duration::from_secs(2)).await {
            return Ok(TerminateOutcome::Forced);
        }

        Err(RestartError::TerminateTimeout { pid })
    }

    /// Relaunch via `open`: `-g` keeps it in the background, `-a` resolves
    /// the app by name the same way Finder would.
    pub async fn launch(&self) -> Result<(), RestartError> {
        self.launch_with("open").await
    }

    async fn launch_with(&self, launcher: &str) -> Result<(), RestartError> {
        let output = Command::new(launcher)
            .args(["-ga", &self.app_name])
            .output()
            .await
            .map_err(|e| RestartError::LaunchFailed {
                app: self.app_name.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RestartError::LaunchFailed {
                app: self.app_name.clone(),
                detail: format!("{launcher} exited {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }

    async fn wait_for_exit(&self, target: Pid, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !process_alive(target) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.terminate_poll).await;
        }
    }
}

/// Signal 0 existence check. EPERM means it exists but is not ours.
fn process_alive(target: Pid) -> bool {
    match kill(target, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}
