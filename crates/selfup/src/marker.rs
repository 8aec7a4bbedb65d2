//! Install markers.
//!
//! A marker records the content hash of the archive a destination was
//! installed from, so installing the same archive again can be skipped.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::UpdateError;

/// Marker file name inside an installed directory.
pub const MARKER_FILE: &str = ".selfup.done";

/// Marker location: inside `destination` when it is a directory, otherwise
/// `<destination>.selfup.done` beside it.
pub fn marker_path(destination: &Path) -> PathBuf {
    if destination.is_dir() {
        destination.join(MARKER_FILE)
    } else {
        let mut path = OsString::from(destination.as_os_str());
        path.push(MARKER_FILE);
        PathBuf::from(path)
    }
}

/// Whether `destination` is marked as installed from `expected`.
pub fn is_already_done(destination: &Path, expected: &str) -> Result<bool, UpdateError> {
    let path = marker_path(destination);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim() == expected),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Mark `destination` as installed from `expected`, replacing any older
/// marker.
pub fn write_already_done(destination: &Path, expected: &str) -> Result<(), UpdateError> {
    let path = marker_path(destination);
    if path.exists() {
        fs::remove_file(&path)?;
    }
    fs::write(&path, expected)?;
    Ok(())
}
