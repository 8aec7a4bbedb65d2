//! Content hashing for downloaded archives.
//!
//! Releases publish a SHA-1 digest (40 hex characters) per asset. Cached
//! archives and fresh downloads are checked against it before install.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::UpdateError;

/// Buffer size for reading files during hash computation.
const HASH_BUFFER_SIZE: usize = 8192;

/// Raw SHA-1 digest.
pub type ContentDigest = [u8; 20];

/// Compute the digest of in-memory content.
pub fn digest(bytes: &[u8]) -> ContentDigest {
    Sha1::digest(bytes).into()
}

/// Render a digest as 40 lower-case hex characters.
pub fn to_hex(digest: &ContentDigest) -> String {
    hex::encode(digest)
}

/// Hex digest of in-memory content.
pub fn content_hash(bytes: &[u8]) -> String {
    to_hex(&digest(bytes))
}

/// Hex digest of a file, read in chunks.
pub fn file_hash(path: &Path) -> Result<String, UpdateError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let digest: ContentDigest = hasher.finalize().into();
    Ok(to_hex(&digest))
}

/// Compare two hex digests, ignoring case, in constant time.
pub fn hashes_match(actual: &str, expected: &str) -> bool {
    let actual = actual.to_ascii_lowercase();
    let expected = expected.to_ascii_lowercase();
    actual.len() == expected.len() && actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Check that a file's content hash equals `expected`.
pub fn verify_file(path: &Path, expected: &str) -> Result<(), UpdateError> {
    let actual = file_hash(path)?;
    if !hashes_match(&actual, expected) {
        return Err(UpdateError::HashMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Whether a cached archive can be used instead of downloading again.
///
/// Without an expected hash the archive only has to exist; with one, its
/// content must also hash to it.
pub fn is_cache_valid(path: &Path, expected: Option<&str>) -> Result<bool, UpdateError> {
    if !path.is_file() {
        return Ok(false);
    }

    match expected {
        None => Ok(true),
        Some(expected) => match verify_file(path, expected) {
            Ok(()) => Ok(true),
            Err(UpdateError::HashMismatch { actual, .. }) => {
                debug!(
                    path = %path.display(),
                    expected,
                    actual = %actual,
                    "Cached archive is stale"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        },
    }
}
