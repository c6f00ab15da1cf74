//! Exclusive advisory lock over a shared simulation directory.

use crate::error::{Result, SimError};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock file created at the top of the data directory.
pub const LOCK_FILE_NAME: &str = "lockfile";

/// Holds a non-blocking exclusive `flock` on `<dir>/lockfile`.
///
/// The lock is released when this value is dropped, so every exit path of
/// the run (success, error, interrupt) gives the directory back. The lock
/// file itself is left on disk.
pub struct DirLock {
    dir: PathBuf,
    lock_file: PathBuf,
    lock: Option<Flock<File>>,
}

impl DirLock {
    /// Locks `dir`, failing immediately if another run holds it.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let lock_file = dir.join(LOCK_FILE_NAME);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file)
            .map_err(|e| SimError::io(&lock_file, e))?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(SimError::DirectoryLocked { lock_file, dir });
            }
            Err((_, errno)) => {
                return Err(SimError::io(&lock_file, std::io::Error::from(errno)));
            }
        };

        debug!("Acquired lock {}", lock_file.display());
        Ok(Self {
            dir,
            lock_file,
            lock: Some(lock),
        })
    }

    /// The locked directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    /// Releases the lock now instead of at drop.
    pub fn release(mut self) -> Result<()> {
        self.unlock()
    }

    fn unlock(&mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        match lock.unlock() {
            Ok(_file) => {
                debug!("Released lock {}", self.lock_file.display());
                Ok(())
            }
            // Dropping the returned Flock closes the descriptor, which also unlocks.
            Err((_lock, errno)) => Err(SimError::io(&self.lock_file, std::io::Error::from(errno))),
        }
    }
}

impl std::fmt::Debug for DirLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirLock")
            .field("lock_file", &self.lock_file)
            .field("held", &self.lock.is_some())
            .finish()
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!("{}", e);
        }
    }
}
