use std::time::Duration;
use tracing::debug;

use crate::probe::Snapshot;

/// Decision returned by the restart policy after evaluating a probe snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the target alone this pass.
    NoOp,
    /// Uptime has reached the threshold; terminate and relaunch now.
    RestartNow,
}

/// Decide whether the target application needs a restart.
///
/// Only an app observed running with uptime at or past the threshold is
/// restarted. A stopped app is never launched from here: cold-launching
/// something the user quit on purpose would be a surprise, so an interrupted
/// restart (terminated but not yet relaunched when the session ended) stays
/// stopped until the user opens it again.
pub fn decide(snapshot: &Snapshot, threshold: Duration) -> Action {
    if !snapshot.running {
        debug!("target not running, nothing to restart");
        return Action::NoOp;
    }

    match snapshot.uptime {
        Some(uptime) if uptime >= threshold => {
            debug!(
                uptime_mins = uptime.as_secs() / 60,
                threshold_mins = threshold.as_secs() / 60,
                "uptime reached threshold"
            );
            Action::RestartNow
        }
        Some(_) => Action::NoOp,
        // Running but uptime unknown: without evidence the timer is close,
        // restarting would be guesswork. The next pass will know more.
        None => Action::NoOp,
    }
}
