//! Archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::UpdateError;

/// Unpacks a downloaded archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<(), UpdateError>;
}

/// Callback invoked with the relative path of every extracted entry.
pub type EntryCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Extracts `.zip` archives.
///
/// Entries whose names would escape the output directory are skipped. On
/// unix, permission bits stored in the archive are restored so executables
/// stay executable.
#[derive(Default, Clone)]
pub struct ZipExtractor {
    on_entry: Option<EntryCallback>,
}

impl ZipExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every extracted entry to `callback`.
    pub fn with_entry_callback<F>(callback: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        Self {
            on_entry: Some(Arc::new(callback)),
        }
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<(), UpdateError> {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        fs::create_dir_all(out_dir)?;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping unsafe archive entry: {}", entry.name());
                continue;
            };
            let target = out_dir.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut output = File::create(&target)?;
                io::copy(&mut entry, &mut output)?;
            }

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }

            if let Some(callback) = &self.on_entry {
                callback(&relative);
            }
        }

        debug!(
            "Extracted {} entries from {} into {}",
            zip.len(),
            archive.display(),
            out_dir.display()
        );
        Ok(())
    }
}
