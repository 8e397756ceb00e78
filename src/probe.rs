/// Read-only process-table probe for the target application.
///
/// Uses `pgrep -x` to find the process and `ps -o etime=` for its elapsed
/// runtime. Any query failure (spawn error, no match, unparseable output)
/// degrades to "not running" so callers default to doing nothing destructive.
use std::time::Duration;
use tokio::process::Command;

/// What the probe observed about the target application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub running: bool,
    /// Pid of the observed process (None when not running).
    pub pid: Option<i32>,
    /// Elapsed runtime of the observed process (None when not running).
    pub uptime: Option<Duration>,
}

impl Snapshot {
    pub fn not_running() -> Self {
        Self {
            running: false,
            pid: None,
            uptime: None,
        }
    }
}

pub struct ProcessProbe {
    /// Executable name as matched exactly by `pgrep -x`.
    name: String,
}

impl ProcessProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Observe the target's current state. Never fails; see module docs.
    pub async fn snapshot(&self) -> Snapshot {
        let Some(pid) = self.find_pid().await else {
            return Snapshot::not_running();
        };

        // The process can exit between the two queries; an empty ps answer
        // means it is gone, which the caller treats as not running.
        let Some(uptime) = self.query_uptime(pid).await else {
            return Snapshot::not_running();
        };

        Snapshot {
            running: true,
            pid: Some(pid),
            uptime: Some(uptime),
        }
    }

    async fn find_pid(&self) -> Option<i32> {
        let output = match Command::new("pgrep")
            .args(["-x", &self.name])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "pgrep could not be spawned, assuming not running");
                return None;
            }
        };

        // pgrep exits 1 when nothing matched.
        if !output.status.success() {
            return None;
        }

        first_pid(&String::from_utf8_lossy(&output.stdout))
    }

    async fn query_uptime(&self, pid: i32) -> Option<Duration> {
        let output = match Command::new("ps")
            .args(["-o", "etime=", "-p", &pid.to_string()])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, pid, "ps could not be spawned, assuming not running");
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }

        parse_etime(&String::from_utf8_lossy(&output.stdout))
    }
}

/// First pid from pgrep output (one pid per line). SoundSource runs a single
/// instance; if the table somehow holds several matches the oldest-listed one
/// is the one whose trial timer matters.
fn first_pid(stdout: &str) -> Option<i32> {
    stdout.lines().find_map(|line| line.trim().parse().ok())
}

/// Parse `ps` etime output: `mm:ss`, `hh:mm:ss`, or `dd-hh:mm:ss`,
/// possibly padded with whitespace.
fn parse_etime(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (days, rest) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };

    let fields: Vec<&str> = rest.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [m, sec] => (0, m.parse::<u64>().ok()?, sec.parse::<u64>().ok()?),
        [h, m, sec] => (
            h.parse::<u64>().ok()?,
            m.parse::<u64>().ok()?,
            sec.parse::<u64>().ok()?,
        ),
        _ => return None,
    };

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    Some(Duration::from_secs(
        ((days * 24 + hours) * 60 + minutes) * 60 + seconds,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_etime_minutes_seconds() {
        assert_eq!(parse_etime("05:32"), Some(Duration::from_secs(5 * 60 + 32)));
        assert_eq!(parse_etime("00:00"), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_parse_etime_hours() {
        assert_eq!(
            parse_etime("02:01:09"),
            Some(Duration::from_secs(2 * 3600 + 69))
        );
    }

    #[test]
    fn test_parse_etime_days() {
        assert_eq!(
            parse_etime("3-01:02:03"),
            Some(Duration::from_secs(3 * 86400 + 3600 + 123))
        );
    }

    #[test]
    fn test_parse_etime_ps_padding() {
        // ps right-aligns the column; leading whitespace and the trailing
        // newline are normal.
        assert_eq!(
            parse_etime("   14:59\n"),
            Some(Duration::from_secs(14 * 60 + 59))
        );
    }

    #[test]
    fn test_parse_etime_rejects_garbage() {
        assert_eq!(parse_etime(""), None);
        assert_eq!(parse_etime("  \n"), None);
        assert_eq!(parse_etime("not-a-time"), None);
        assert_eq!(parse_etime("1:2:3:4"), None);
        assert_eq!(parse_etime("10:99"), None);
    }

    #[test]
    fn test_first_pid_takes_first_line() {
        assert_eq!(first_pid("123\n456\n"), Some(123));
        assert_eq!(first_pid(" 789 \n"), Some(789));
        assert_eq!(first_pid(""), None);
        assert_eq!(first_pid("garbage\n42\n"), Some(42));
    }

    #[tokio::test]
    async fn test_snapshot_of_absent_process_is_not_running() {
        let probe = ProcessProbe::new("definitely-not-a-real-process-name");
        let snapshot = probe.snapshot().await;
        assert_eq!(snapshot, Snapshot::not_running());
    }
}
