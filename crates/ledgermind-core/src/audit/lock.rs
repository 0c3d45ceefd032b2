//! Advisory cross-process file locking
//!
//! OS-level exclusive lock over a `.lock` file, acquired with exponential
//! backoff: base 50 ms, doubling, capped at 2 s, at least 15 attempts before
//! surfacing [`AuditError::LockContention`].

use super::AuditError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BASE_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MIN_ATTEMPTS: u32 = 15;

/// A held advisory lock; releases on drop.
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, retrying with exponential backoff until
    /// `MIN_ATTEMPTS` attempts have been made.
    pub fn acquire(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(AuditError::Io)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(AuditError::Io)?;

        let mut backoff = BASE_BACKOFF;
        for attempt in 0..MIN_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(_) if attempt + 1 < MIN_ATTEMPTS => {
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(_) => break,
            }
        }
        Err(AuditError::LockContention)
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
