use std::path::{Path, PathBuf};

/// Manages the `~/.config/sourcesound-restart/` directory layout.
///
/// All watchdog artifacts live under a single user-writable directory that
/// persists across package upgrades and uninstalls. This struct provides
/// accessors for each well-known path and handles initialization.
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    /// Create a new ConfigDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the default location under the invoking user's home directory.
    pub fn resolve() -> std::io::Result<Self> {
        let home = std::env::var_os("HOME").ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME is not set; cannot locate the config directory",
            )
        })?;
        Ok(Self::new(
            PathBuf::from(home)
                .join(".config")
                .join("sourcesound-restart"),
        ))
    }

    /// The root directory (e.g. `~/.config/sourcesound-restart/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the watchdog log file.
    pub fn log(&self) -> PathBuf {
        self.root.join("sourcesound-restart.log")
    }

    /// Path the previous log generation is rotated to.
    pub fn log_old(&self) -> PathBuf {
        self.root.join("sourcesound-restart.log.old")
    }

    /// Path to the single-instance lock file.
    pub fn lock(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// Path to the optional config file.
    pub fn config(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Create the directory if it does not exist yet.
    /// Returns Ok(true) if it was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        Ok(created)
    }
}

/// Resolve the path this binary was invoked through, without resolving
/// symlinks.
///
/// The LaunchAgent plist must reference the stable symlink path (Homebrew's
/// `opt` indirection), never the versioned Cellar location that is deleted on
/// every upgrade. `std::env::current_exe` canonicalizes on macOS, so it would
/// capture exactly the wrong path; instead argv[0] is absolutized against the
/// working directory and left otherwise untouched.
pub fn stable_invocation_path() -> std::io::Result<PathBuf> {
    let argv0 = std::env::args_os().next().map(PathBuf::from);
    let cwd = std::env::current_dir()?;
    match argv0.and_then(|p| absolutize_argv0(&p, &cwd)) {
        Some(path) => Ok(path),
        // Bare command name found via PATH: the canonical location is the
        // best remaining answer.
        None => std::env::current_exe(),
    }
}

fn absolutize_argv0(argv0: &Path, cwd: &Path) -> Option<PathBuf> {
    if argv0.as_os_str().is_empty() {
        return None;
    }
    if argv0.is_absolute() {
        return Some(argv0.to_path_buf());
    }
    // A relative path with a separator ("./x", "dir/x") is cwd-relative.
    // A bare name was looked up via PATH and carries no location.
    if argv0.components().count() > 1 {
        return Some(cwd.join(argv0));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_paths() {
        let dir = ConfigDir::new("/home/u/.config/sourcesound-restart");
        assert_eq!(
            dir.log(),
            PathBuf::from("/home/u/.config/sourcesound-restart/sourcesound-restart.log")
        );
        assert_eq!(
            dir.log_old(),
            PathBuf::from("/home/u/.config/sourcesound-restart/sourcesound-restart.log.old")
        );
        assert_eq!(
            dir.lock(),
            PathBuf::from("/home/u/.config/sourcesound-restart/lock")
        );
        assert_eq!(
            dir.config(),
            PathBuf::from("/home/u/.config/sourcesound-restart/config.toml")
        );
    }

    #[test]
    fn test_init_creates_directory_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".config/sourcesound-restart");
        let dir = ConfigDir::new(&root);

        assert!(!root.exists());
        assert!(dir.init().unwrap());
        assert!(root.exists());
        assert!(!dir.init().unwrap());
    }

    #[test]
    fn test_absolute_argv0_is_kept_verbatim() {
        // The whole point: a symlink path must survive unresolved.
        let path = absolutize_argv0(
            Path::new("/opt/homebrew/opt/sourcesound-restart/bin/sourcesound-restart"),
            Path::new("/anywhere"),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/opt/homebrew/opt/sourcesound-restart/bin/sourcesound-restart")
        );
    }

    #[test]
    fn test_relative_argv0_joins_cwd() {
        let path = absolutize_argv0(Path::new("./bin/sourcesound-restart"), Path::new("/work"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/work/./bin/sourcesound-restart"));
    }

    #[test]
    fn test_bare_name_has_no_location() {
        assert!(absolutize_argv0(Path::new("sourcesound-restart"), Path::new("/work")).is_none());
        assert!(absolutize_argv0(Path::new(""), Path::new("/work")).is_none());
    }
}
