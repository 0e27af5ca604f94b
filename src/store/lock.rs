//! Build lock
//!
//! An advisory exclusive lock on `<path>.lock`, held for the whole of a
//! build. The OS drops it when the owning process dies; the guard drops it
//! on every other exit path. The lock file itself is left in place.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::artifact::lock_path;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Held build lock; released on drop.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn open_lock_file(path: &Path) -> StoreResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StoreError::io_error_at_path(path, e))
}

impl BuildLock {
    /// Takes the build lock for the artifact at `artifact_path`.
    ///
    /// Blocks while another thread or process holds it. With a timeout,
    /// gives up with `LockTimeout` once it has elapsed.
    pub fn acquire(artifact_path: &Path, timeout: Option<Duration>) -> StoreResult<Self> {
        let path = lock_path(artifact_path);
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => return Ok(Self { file, path }),
            Err(e) if is_contended(&e) => {}
            Err(e) => return Err(StoreError::io_error_at_path(&path, e)),
        }

        let path_display = path.display().to_string();
        log_event_with_fields(Event::LockWait, &[("lock", path_display.as_str())]);
        let started = Instant::now();

        match timeout {
            None => {
                file.lock_exclusive()
                    .map_err(|e| StoreError::io_error_at_path(&path, e))?;
            }
            Some(timeout) => loop {
                match file.try_lock_exclusive() {
                    Ok(()) => break,
                    Err(e) if is_contended(&e) => {
                        if started.elapsed() >= timeout {
                            return Err(StoreError::lock_timeout(&path, timeout.as_millis() as u64));
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => return Err(StoreError::io_error_at_path(&path, e)),
                }
            },
        }

        let waited = started.elapsed().as_millis().to_string();
        log_event_with_fields(Event::LockAcquired, &[("lock", path_display.as_str()), ("waited_ms", waited.as_str())]);
        Ok(Self { file, path })
    }

    /// Whether some other holder currently has the build lock.
    pub fn is_held_elsewhere(artifact_path: &Path) -> StoreResult<bool> {
        let path = lock_path(artifact_path);
        if !path.exists() {
            return Ok(false);
        }

        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(StoreError::io_error_at_path(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}
