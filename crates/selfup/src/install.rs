//! Verified download-and-install pipeline.
//!
//! Installs the contents of a release archive into a destination directory:
//!
//! 1. Lock the destination against other installers (any process)
//! 2. Reuse the cached archive if valid, otherwise download it with retries
//! 3. Extract it into a scratch directory next to the cache
//! 4. Swap the extracted subdirectory into the destination with renames
//! 5. Clean up the scratch directory and release the lock
//!
//! Every failure after the lock is taken comes back as a single
//! [`UpdateError::InstallationFailed`] naming the cache entry, with the
//! underlying error as its source.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::archive::ArchiveExtractor;
use crate::download::{Auth, Downloader};
use crate::error::UpdateError;
use crate::lock::InstallLock;
use crate::marker;

/// Everything needed to install one archive.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Name of the archive in the download cache (without `.zip`)
    pub cache_name: String,
    /// Where to download the archive from
    pub url: String,
    /// Content hash published for the archive
    pub expected_hash: Option<String>,
    /// Directory that ends up holding the installed files
    pub destination: PathBuf,
    /// Directory inside the archive that becomes `destination`
    pub archive_subdir: PathBuf,
    /// Cache of downloaded archives and scratch space
    pub download_dir: PathBuf,
    /// Whether to check content against `expected_hash`
    pub verify_hash: bool,
    /// Credentials for the download
    pub auth: Option<Auth>,
    /// Shown when the install starts and finishes
    pub message: Option<String>,
}

impl InstallRequest {
    pub fn new(
        cache_name: impl Into<String>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            url: url.into(),
            expected_hash: None,
            destination: destination.into(),
            archive_subdir: PathBuf::from("bin"),
            download_dir: download_dir.into(),
            verify_hash: true,
            auth: None,
            message: None,
        }
    }

    pub fn with_expected_hash(mut self, hash: Option<String>) -> Self {
        self.expected_hash = hash;
        self
    }

    pub fn with_archive_subdir(mut self, subdir: impl Into<PathBuf>) -> Self {
        self.archive_subdir = subdir.into();
        self
    }

    pub fn with_verify_hash(mut self, verify_hash: bool) -> Self {
        self.verify_hash = verify_hash;
        self
    }

    pub fn with_auth(mut self, auth: Option<Auth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Cached archive: `download_dir/<cache_name>.zip`.
    pub fn cache_path(&self) -> PathBuf {
        self.download_dir.join(format!("{}.zip", self.cache_name))
    }

    /// Extraction scratch directory: `download_dir/<cache_name>`.
    pub fn scratch_dir(&self) -> PathBuf {
        self.download_dir.join(&self.cache_name)
    }

    /// Hash downloads are checked against, if verification applies.
    fn verification_hash(&self) -> Option<&str> {
        if self.verify_hash {
            self.expected_hash.as_deref()
        } else {
            None
        }
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The archive was extracted and published to the destination
    Installed,
    /// The destination's install marker already matched the expected hash
    AlreadyInstalled,
}

/// Downloads, verifies, extracts and publishes release archives.
#[derive(Clone)]
pub struct InstallPipeline {
    downloader: Downloader,
    extractor: Arc<dyn ArchiveExtractor>,
    use_install_marker: bool,
}

impl InstallPipeline {
    pub fn new(downloader: Downloader, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        Self {
            downloader,
            extractor,
            use_install_marker: false,
        }
    }

    /// Skip installs whose destination is already marked with the expected
    /// hash, and mark destinations after installing.
    pub fn with_install_marker(mut self, enabled: bool) -> Self {
        self.use_install_marker = enabled;
        self
    }

    pub fn uses_install_marker(&self) -> bool {
        self.use_install_marker
    }

    /// Install `request.archive_subdir` of the archive at `request.url` into
    /// `request.destination`.
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, UpdateError> {
        if let Some(message) = &request.message {
            info!("{}.", message);
        }

        let lock = match InstallLock::acquire_async(&request.destination).await {
            Ok(lock) => lock,
            Err(e) => return Err(self.fail(request, e)),
        };

        let result = self.install_locked(request).await;
        lock.release();

        match result {
            Ok(outcome) => {
                if let Some(message) = &request.message {
                    info!("{} done.", message);
                }
                Ok(outcome)
            }
            Err(e) => Err(self.fail(request, e)),
        }
    }

    fn fail(&self, request: &InstallRequest, source: UpdateError) -> UpdateError {
        let err = UpdateError::installation(&request.cache_name, source);
        error!(
            "[err] {}:\n{}",
            request.message.as_deref().unwrap_or("install"),
            err.diagnostic()
        );
        err
    }

    async fn install_locked(&self, request: &InstallRequest) -> Result<InstallOutcome, UpdateError> {
        if self.use_install_marker {
            if let Some(hash) = request.expected_hash.as_deref() {
                if marker::is_already_done(&request.destination, hash)? {
                    info!(
                        "{} already holds {}, skipping install",
                        request.destination.display(),
                        request.cache_name
                    );
                    return Ok(InstallOutcome::AlreadyInstalled);
                }
            }
        }

        let cache_path = request.cache_path();
        self.downloader
            .download_to_cache(
                &request.url,
                request.auth.as_ref(),
                &cache_path,
                request.verification_hash(),
            )
            .await?;

        let scratch = request.scratch_dir();
        remove_path_if_exists(&scratch)?;

        let published = self
            .extractor
            .extract(&cache_path, &scratch)
            .and_then(|()| publish(&scratch.join(&request.archive_subdir), &request.destination));

        if let Err(e) = remove_path_if_exists(&scratch) {
            warn!("Failed to clean up {}: {}", scratch.display(), e);
        }
        published?;

        if self.use_install_marker {
            if let Some(hash) = request.expected_hash.as_deref() {
                marker::write_already_done(&request.destination, hash)?;
            }
        }

        info!(
            "Installed {} into {}",
            request.cache_name,
            request.destination.display()
        );
        Ok(InstallOutcome::Installed)
    }
}

/// Move `staged` to `destination`, replacing whatever was there.
///
/// The previous destination is renamed aside first and restored if the new
/// tree cannot be moved in, so `destination` holds either the old or the new
/// content. Both renames are atomic only within one filesystem.
fn publish(staged: &Path, destination: &Path) -> Result<(), UpdateError> {
    if fs::symlink_metadata(staged).is_err() {
        return Err(UpdateError::IoError(io::Error::new(
            io::ErrorKind::NotFound,
            format!("archive does not contain {}", staged.display()),
        )));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let backup = sibling(destination, ".previous");
    remove_path_if_exists(&backup)?;

    let had_previous = fs::symlink_metadata(destination).is_ok();
    if had_previous {
        fs::rename(destination, &backup)?;
    }

    if let Err(e) = fs::rename(staged, destination) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, destination) {
                error!(
                    "Failed to restore {} from {}: {}",
                    destination.display(),
                    backup.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    if had_previous {
        if let Err(e) = remove_path_if_exists(&backup) {
            warn!("Failed to remove previous install {}: {}", backup.display(), e);
        }
    }

    debug!("Published {} to {}", staged.display(), destination.display());
    Ok(())
}

/// `.<name><suffix>` in the same directory as `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_path_if_exists(path: &Path) -> Result<(), UpdateError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
