/// One watchdog pass: probe → decide → act → log.
///
/// Each launchd invocation runs exactly one pass and exits; state is
/// re-derived from the process table every time. Errors inside a pass are
/// logged and swallowed; the watchdog must never turn a failed restart into
/// a crash-looping job, the next scheduled pass simply tries again.
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::{Config, RESTART_THRESHOLD};
use crate::controller::AppController;
use crate::policy::{self, Action};
use crate::probe::{ProcessProbe, Snapshot};

/// Last-known state of the target within one watchdog lifetime.
#[derive(Debug, Clone, Copy)]
pub struct WatchState {
    pub running: bool,
    pub uptime: Option<Duration>,
    /// Set when this pass performed a restart; the uptime clock restarts
    /// from (approximately) this moment.
    pub restarted_at: Option<DateTime<Utc>>,
}

impl WatchState {
    pub fn observe(snapshot: &Snapshot) -> Self {
        Self {
            running: snapshot.running,
            uptime: snapshot.uptime,
            restarted_at: None,
        }
    }

    /// Record a completed restart: the app is running again with ~zero uptime.
    pub fn mark_restarted(&mut self) {
        self.running = true;
        self.uptime = Some(Duration::ZERO);
        self.restarted_at = Some(Utc::now());
    }
}

/// Run a single pass and report the resulting state.
pub async fn run_pass(config: &Config) -> WatchState {
    let probe = ProcessProbe::new(&config.app.name);
    let snapshot = probe.snapshot().await;
    let mut state = WatchState::observe(&snapshot);

    match policy::decide(&snapshot, RESTART_THRESHOLD) {
        Action::NoOp => {
            if snapshot.running {
                tracing::info!(
                    app = %config.app.name,
                    uptime_mins = snapshot.uptime.map(|u| u.as_secs() / 60),
                    threshold_mins = RESTART_THRESHOLD.as_secs() / 60,
                    "under threshold, leaving it alone"
                );
            } else {
                tracing::info!(
                    app = %config.app.name,
                    "not running, skipping (never cold-launched from here)"
                );
            }
        }
        Action::RestartNow => {
            let Some(pid) = snapshot.pid else {
                tracing::warn!(app = %config.app.name, "restart decided but pid is unknown");
                return state;
            };

            tracing::info!(
                app = %config.app.name,
                pid,
                uptime_mins = snapshot.uptime.map(|u| u.as_secs() / 60),
                "restarting before the trial-noise trigger"
            );

            let controller = AppController::new(&config.app.name, &config.restart);
            match controller.restart(pid).await {
                Ok(outcome) => {
                    state.mark_restarted();
                    tracing::info!(app = %config.app.name, ?outcome, "restart complete");
                }
                Err(e) => {
                    // Swallowed at the pass boundary; retried next cycle.
                    tracing::error!(app = %config.app.name, error = %e, "restart failed");
                }
            }
        }
    }

    state
}
