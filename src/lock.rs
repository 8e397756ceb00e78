use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Advisory single-instance lock for watchdog passes.
///
/// Launchd's StartInterval semantics already make overlapping invocations
/// unlikely, but the no-concurrent-passes rule is enforced here explicitly
/// rather than assumed: a pass that cannot take the lock must exit without
/// touching the target process. The lock is released when the holder exits,
/// even on a crash.
pub struct InstanceLock {
    file: File,
}

/// Outcome of a lock attempt.
pub enum LockAttempt {
    Acquired(InstanceLock),
    /// Another pass holds the lock; this one must do nothing.
    Busy,
}

impl InstanceLock {
    /// Try to take the exclusive lock without blocking.
    pub fn try_acquire(path: &Path) -> std::io::Result<LockAttempt> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(LockAttempt::Acquired(Self { file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(LockAttempt::Busy),
            Err(e) => Err(e),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
