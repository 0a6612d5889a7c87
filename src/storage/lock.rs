//! Cross-process exclusive lock on a run file.
//!
//! The logger's flush and the monitoring consumer's reads serialize through
//! an advisory `flock(2)` on a sidecar file at `path + ".lock"`. The lock is
//! held only for the duration of one read-or-write critical section and the
//! sidecar never carries data. Acquisition blocks until it succeeds; there
//! is no timeout and contention is not an error.
//!
//! The lock serializes one writer against readers. Two concurrent writers
//! on the same run file are not a supported scenario.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::DaqResult;

/// Sidecar lock path for a run file: the path with `.lock` appended.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

/// RAII guard over the sidecar lock. Released on drop, on all exit paths.
pub struct PathLock {
    file: File,
}

impl PathLock {
    /// Block until the exclusive lock on `path`'s sidecar is held.
    pub fn acquire(path: &Path) -> DaqResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path(path))?;
        flock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well; the explicit
        // unlock just makes the release immediate.
        #[allow(unsafe_code)]
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[allow(unsafe_code)]
fn flock_exclusive(file: &File) -> std::io::Result<()> {
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Run `op` with the exclusive lock on `path`'s sidecar held.
///
/// Blocks until the lock is acquired, runs the critical section, and
/// releases the lock unconditionally — including when `op` errors. Applied
/// uniformly at the writer call site (the flush) and at every reader call
/// site, so a reader never observes a file mid-append.
pub fn with_lock<T>(path: &Path, op: impl FnOnce() -> DaqResult<T>) -> DaqResult<T> {
    let _guard = PathLock::acquire(path)?;
    op()
}
