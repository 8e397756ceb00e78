/// LaunchAgent registration for the watchdog.
///
/// All launchd interaction goes through the narrow [`Supervisor`] seam so the
/// registrar's install/uninstall/status/reload logic is testable against an
/// in-memory fake. The real implementation shells out to `launchctl` against
/// the invoking user's `gui/<uid>` domain.
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::plist;

/// Registration state as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No descriptor on disk.
    NotInstalled,
    /// Descriptor on disk but launchd does not have the job loaded.
    Installed,
    /// Descriptor on disk and the job is loaded in launchd's table
    /// (scheduled passes will fire).
    Running,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::NotInstalled => write!(f, "not installed"),
            ServiceState::Installed => write!(f, "installed (not loaded)"),
            ServiceState::Running => write!(f, "installed and running"),
        }
    }
}

/// The supervisor's view of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loaded,
}

/// Narrow seam over the OS service supervisor.
pub trait Supervisor {
    /// Register the descriptor file with the supervisor.
    fn bootstrap(&self, plist_path: &Path) -> Result<(), String>;
    /// Remove the labeled job from the supervisor's table.
    fn bootout(&self) -> Result<(), String>;
    /// Whether the labeled job is currently in the supervisor's table.
    fn query(&self) -> LoadState;
}

/// Real supervisor: `launchctl` against the user's GUI domain.
pub struct Launchctl {
    label: String,
    uid: u32,
}

impl Launchctl {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            uid: nix::unistd::Uid::current().as_raw(),
        }
    }

    fn service_target(&self) -> String {
        format!("gui/{}/{}", self.uid, self.label)
    }

    fn run(&self, args: &[&str]) -> Result<(), String> {
        let output = Command::new("launchctl")
            .args(args)
            .output()
            .map_err(|e| format!("failed to spawn launchctl: {e}"))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        Err(format!("launchctl {} failed: {}", args[0], detail.trim()))
    }
}

impl Supervisor for Launchctl {
    fn bootstrap(&self, plist_path: &Path) -> Result<(), String> {
        let domain = format!("gui/{}", self.uid);
        self.run(&["bootstrap", &domain, &plist_path.to_string_lossy()])
    }

    fn bootout(&self) -> Result<(), String> {
        self.run(&["bootout", &self.service_target()])
    }

    fn query(&self) -> LoadState {
        // `launchctl print` exits non-zero when the job is not in the table.
        let loaded = Command::new("launchctl")
            .args(["print", &self.service_target()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if loaded {
            LoadState::Loaded
        } else {
            LoadState::NotLoaded
        }
    }
}

#[derive(Debug)]
pub enum InstallError {
    WriteDescriptor {
        path: PathBuf,
        source: std::io::Error,
    },
    Bootstrap {
        detail: String,
    },
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::WriteDescriptor { path, source } => {
                write!(
                    f,
                    "failed to write service descriptor {}: {source}",
                    path.display()
                )
            }
            InstallError::Bootstrap { detail } => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InstallError::WriteDescriptor { source, .. } => Some(source),
            InstallError::Bootstrap { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum UninstallError {
    RemoveDescriptor {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for UninstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UninstallError::RemoveDescriptor { path, source } => {
                write!(
                    f,
                    "failed to remove service descriptor {}: {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for UninstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UninstallError::RemoveDescriptor { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub enum ReloadError {
    Uninstall(UninstallError),
    Install(InstallError),
}

impl std::fmt::Display for ReloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadError::Uninstall(e) => write!(f, "reload: {e}"),
            ReloadError::Install(e) => write!(f, "reload: {e}"),
        }
    }
}

impl std::error::Error for ReloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReloadError::Uninstall(e) => Some(e),
            ReloadError::Install(e) => Some(e),
        }
    }
}

/// Default LaunchAgents location for the invoking user.
pub fn launch_agents_plist(label: &str) -> std::io::Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "HOME is not set; cannot locate ~/Library/LaunchAgents",
        )
    })?;
    Ok(PathBuf::from(home)
        .join("Library/LaunchAgents")
        .join(format!("{label}.plist")))
}

pub struct ServiceRegistrar<S> {
    label: String,
    plist_path: PathBuf,
    log_path: PathBuf,
    start_interval_secs: u64,
    supervisor: S,
}

impl<S: Supervisor> ServiceRegistrar<S> {
    pub fn new(
        label: impl Into<String>,
        plist_path: PathBuf,
        log_path: PathBuf,
        start_interval_secs: u64,
        supervisor: S,
    ) -> Self {
        Self {
            label: label.into(),
            plist_path,
            log_path,
            start_interval_secs,
            supervisor,
        }
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    /// Register the watchdog with launchd.
    ///
    /// Idempotent: a descriptor that already exists and is loaded is reported
    /// as success without touching anything, which lets upgrade flows skip
    /// reinstallation. `invocation_target` must be the stable symlink
    /// path; see [`crate::paths::stable_invocation_path`].
    pub fn install(&self, invocation_target: &Path) -> Result<(), InstallError> {
        if self.plist_path.exists() && self.supervisor.query() == LoadState::Loaded {
            tracing::info!(label = %self.label, "service already installed and loaded");
            return Ok(());
        }

        self.write_descriptor(invocation_target)?;

        if let Err(detail) = self.supervisor.bootstrap(&self.plist_path) {
            // A concurrent or earlier bootstrap of the same label makes
            // launchctl complain; if the job is in the table now, the goal
            // state is reached.
            if self.supervisor.query() == LoadState::Loaded {
                tracing::info!(label = %self.label, "service was already bootstrapped");
                return Ok(());
            }
            return Err(InstallError::Bootstrap { detail });
        }

        Ok(())
    }

    /// Unregister and remove the descriptor. Idempotent: uninstalling when
    /// nothing is registered succeeds silently.
    pub fn uninstall(&self) -> Result<(), UninstallError> {
        if self.supervisor.query() == LoadState::Loaded {
            if let Err(detail) = self.supervisor.bootout() {
                // The job can vanish between query and bootout; the removal
                // below is what actually matters.
                tracing::warn!(label = %self.label, detail, "bootout reported an error");
            }
        }

        match std::fs::remove_file(&self.plist_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UninstallError::RemoveDescriptor {
                path: self.plist_path.clone(),
                source: e,
            }),
        }
    }

    pub fn status(&self) -> ServiceState {
        if !self.plist_path.exists() {
            return ServiceState::NotInstalled;
        }
        match self.supervisor.query() {
            LoadState::Loaded => ServiceState::Running,
            LoadState::NotLoaded => ServiceState::Installed,
        }
    }

    /// Unregister, then re-register with the current stable path. The escape
    /// hatch for upgrades where the descriptor already existed and `install`'s
    /// idempotent shortcut would leave stale contents in place.
    pub fn reload(&self, invocation_target: &Path) -> Result<(), ReloadError> {
        self.uninstall().map_err(ReloadError::Uninstall)?;
        self.write_descriptor(invocation_target)
            .map_err(ReloadError::Install)?;
        self.supervisor
            .bootstrap(&self.plist_path)
            .map_err(|detail| ReloadError::Install(InstallError::Bootstrap { detail }))?;
        Ok(())
    }

    fn write_descriptor(&self, invocation_target: &Path) -> Result<(), InstallError> {
        let contents = plist::generate_plist(
            &self.label,
            invocation_target,
            self.start_interval_secs,
            &self.log_path,
        );

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.plist_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.plist_path, contents.as_bytes())
        };

        write().map_err(|e| InstallError::WriteDescriptor {
            path: self.plist_path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// In-memory supervisor: tracks loadedness and records calls.
    struct FakeSupervisor {
        loaded: Cell<bool>,
        bootstrap_calls: RefCell<Vec<PathBuf>>,
        bootout_calls: Cell<u32>,
        fail_bootstrap: bool,
    }

    impl FakeSupervisor {
        fn new() -> Self {
            Self {
                loaded: Cell::new(false),
                bootstrap_calls: RefCell::new(Vec::new()),
                bootout_calls: Cell::new(0),
                fail_bootstrap: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_bootstrap: true,
                ..Self::new()
            }
        }
    }

    impl Supervisor for FakeSupervisor {
        fn bootstrap(&self, plist_path: &Path) -> Result<(), String> {
            self.bootstrap_calls
                .borrow_mut()
                .push(plist_path.to_path_buf());
            if self.fail_bootstrap {
                return Err("Bootstrap failed: 5: Input/output error".to_string());
            }
            self.loaded.set(true);
            Ok(())
        }

        fn bootout(&self) -> Result<(), String> {
            self.bootout_calls.set(self.bootout_calls.get() + 1);
            self.loaded.set(false);
            Ok(())
        }

        fn query(&self) -> LoadState {
            if self.loaded.get() {
                LoadState::Loaded
            } else {
                LoadState::NotLoaded
            }
        }
    }

    fn registrar(
        dir: &Path,
        supervisor: FakeSupervisor,
    ) -> ServiceRegistrar<FakeSupervisor> {
        ServiceRegistrar::new(
            "com.user.sourcesound-restart",
            dir.join("LaunchAgents/com.user.sourcesound-restart.plist"),
            dir.join("sourcesound-restart.log"),
            300,
            supervisor,
        )
    }

    fn stable() -> PathBuf {
        PathBuf::from("/opt/homebrew/opt/sourcesound-restart/bin/sourcesound-restart")
    }

    #[test]
    fn test_install_writes_descriptor_and_bootstraps() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        assert_eq!(reg.status(), ServiceState::NotInstalled);
        reg.install(&stable()).unwrap();

        assert_eq!(reg.status(), ServiceState::Running);
        let descriptor = std::fs::read_to_string(reg.plist_path()).unwrap();
        assert!(descriptor.contains(&stable().to_string_lossy().to_string()));
        assert_eq!(reg.supervisor.bootstrap_calls.borrow().len(), 1);
    }

    #[test]
    fn test_install_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(&stable()).unwrap();
        reg.install(&stable()).unwrap();

        assert_eq!(reg.status(), ServiceState::Running);
        // Second install hit the loaded shortcut and never touched launchd.
        assert_eq!(reg.supervisor.bootstrap_calls.borrow().len(), 1);
    }

    #[test]
    fn test_install_rebootstraps_when_descriptor_exists_but_unloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(&stable()).unwrap();
        reg.supervisor.loaded.set(false); // e.g. after logout/login races

        reg.install(&stable()).unwrap();
        assert_eq!(reg.status(), ServiceState::Running);
        assert_eq!(reg.supervisor.bootstrap_calls.borrow().len(), 2);
    }

    #[test]
    fn test_install_surfaces_bootstrap_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::failing());

        let err = reg.install(&stable()).unwrap_err();
        assert!(matches!(err, InstallError::Bootstrap { .. }));
        assert!(err.to_string().contains("Bootstrap failed"));
    }

    #[test]
    fn test_uninstall_then_status_is_not_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(&stable()).unwrap();
        reg.uninstall().unwrap();

        assert_eq!(reg.status(), ServiceState::NotInstalled);
        assert!(!reg.plist_path().exists());
        assert_eq!(reg.supervisor.bootout_calls.get(), 1);
    }

    #[test]
    fn test_uninstall_is_idempotent_on_clean_system() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.uninstall().unwrap();
        reg.uninstall().unwrap();
        assert_eq!(reg.supervisor.bootout_calls.get(), 0);
    }

    #[test]
    fn test_status_distinguishes_installed_from_running() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(&stable()).unwrap();
        assert_eq!(reg.status(), ServiceState::Running);

        reg.supervisor.loaded.set(false);
        assert_eq!(reg.status(), ServiceState::Installed);
    }

    #[test]
    fn test_reload_round_trip_keeps_stable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(&stable()).unwrap();
        reg.reload(&stable()).unwrap();

        assert_eq!(reg.status(), ServiceState::Running);
        let descriptor = std::fs::read_to_string(reg.plist_path()).unwrap();
        assert!(descriptor.contains("/opt/homebrew/opt/sourcesound-restart/bin"));
        assert!(!descriptor.contains("Cellar"));
    }

    #[test]
    fn test_reload_rewrites_descriptor_with_new_target() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registrar(tmp.path(), FakeSupervisor::new());

        reg.install(Path::new("/old/stable/sourcesound-restart"))
            .unwrap();
        reg.reload(&stable()).unwrap();

        let descriptor = std::fs::read_to_string(reg.plist_path()).unwrap();
        assert!(!descriptor.contains("/old/stable"));
        assert!(descriptor.contains("/opt/homebrew/opt/sourcesound-restart/bin"));
    }

    #[test]
    fn test_install_tolerates_already_bootstrapped_race() {
        let tmp = tempfile::tempdir().unwrap();
        let supervisor = FakeSupervisor::failing();
        // Simulate "bootstrap errors because another actor already loaded it".
        supervisor.loaded.set(true);
        let reg = ServiceRegistrar::new(
            "com.user.sourcesound-restart",
            tmp.path().join("LaunchAgents/x.plist"),
            tmp.path().join("x.log"),
            300,
            supervisor,
        );

        // Descriptor missing, so install writes it and calls bootstrap, which
        // fails; but the job is loaded, so the goal state is reached.
        reg.install(&stable()).unwrap();
        assert_eq!(reg.status(), ServiceState::Running);
    }

    #[test]
    fn test_launch_agents_plist_path_shape() {
        // Only shape, not location: the test environment's HOME is arbitrary.
        if let Ok(path) = launch_agents_plist("com.user.sourcesound-restart") {
            let s = path.to_string_lossy();
            assert!(s.ends_with("Library/LaunchAgents/com.user.sourcesound-restart.plist"));
        }
    }
}
