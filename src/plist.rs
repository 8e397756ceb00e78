//! LaunchAgent plist generation.

use std::path::Path;

/// Escape a string for safe interpolation into XML `<string>` elements.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Generate the watchdog's LaunchAgent plist.
///
/// `program` must be the stable symlink path, never the versioned install
/// location: the versioned directory is deleted on every upgrade and a
/// descriptor pointing there stops working silently. launchd invokes
/// `<program> run` every `start_interval_secs`; stdout and stderr are
/// appended to the watchdog log so panics land next to normal log lines.
pub fn generate_plist(
    label: &str,
    program: &Path,
    start_interval_secs: u64,
    log_path: &Path,
) -> String {
    let label = xml_escape(label);
    let program = xml_escape(&program.to_string_lossy());
    let log_path = xml_escape(&log_path.to_string_lossy());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>StartInterval</key>
    <integer>{start_interval_secs}</integer>
    <key>StandardOutPath</key>
    <string>{log_path}</string>
    <key>StandardErrorPath</key>
    <string>{log_path}</string>
    <key>ProcessType</key>
    <string>Background</string>
</dict>
</plist>
"#
    )
}
