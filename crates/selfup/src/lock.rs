//! Cross-process install lock.
//!
//! Serializes installs that target the same destination, including ones
//! running in other processes. The lock is an advisory OS file lock on a
//! file sitting next to the destination, so removing or renaming the
//! destination never deletes a lock that is held.
//!
//! Acquisition waits forever. A holder killed mid-install releases its OS
//! lock with the process, but a holder that hangs blocks every later
//! installer of that destination.
//!
//! Only the destination is locked. The download cache file and the scratch
//! directory are named after the request's cache name, so two requests that
//! share a cache name but install to different destinations are not
//! serialized against each other and can clobber each other's scratch
//! space. Callers keep cache names and destinations one to one.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Exclusive lock on an install destination, released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Lock file guarding `destination`: `.<name>.lock` beside it.
    pub fn lock_path_for(destination: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        match destination.file_name() {
            Some(file_name) => name.push(file_name),
            None => name.push("install"),
        }
        name.push(".lock");
        destination.with_file_name(name)
    }

    /// Block until the lock for `destination` is held.
    pub fn acquire(destination: &Path) -> Result<Self, UpdateError> {
        let path = Self::lock_path_for(destination);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        debug!("Waiting for install lock {}", path.display());
        file.lock_exclusive()?;
        debug!("Acquired install lock {}", path.display());

        Ok(Self { file, path })
    }

    /// Acquire the lock without blocking the async runtime.
    pub async fn acquire_async(destination: &Path) -> Result<Self, UpdateError> {
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&destination))
            .await
            .map_err(|e| UpdateError::IoError(std::io::Error::other(e)))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release install lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released install lock {}", self.path.display());
        }
    }
}
