//! Error types for the update system.

use thiserror::Error;

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Transport failure while talking to a remote server
    #[error("network error: {0}")]
    NetworkError(String),

    /// Download failed with a non-success HTTP status
    #[error("download failed with status {status}")]
    DownloadFailed { status: u16 },

    /// Content hash does not match the value published with the release
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Installing a downloaded archive failed
    #[error("failed to install {cache_name}")]
    InstallationFailed {
        cache_name: String,
        #[source]
        source: Box<UpdateError>,
    },

    /// Self-replacement could not be scheduled
    #[error("invalid handoff: {0}")]
    InvalidHandoff(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Version string does not follow `[v]MAJOR.MINOR.PATCH`
    #[error("version parse error: {0}")]
    VersionParseError(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl UpdateError {
    /// Wrap an error raised while installing `cache_name`.
    pub fn installation(cache_name: impl Into<String>, source: UpdateError) -> Self {
        UpdateError::InstallationFailed {
            cache_name: cache_name.into(),
            source: Box::new(source),
        }
    }

    /// Full diagnostic text: this error followed by its chain of causes.
    pub fn diagnostic(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            text.push_str("\n  caused by: ");
            text.push_str(&err.to_string());
            cause = err.source();
        }
        text
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::HttpError(err.to_string())
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(err: zip::result::ZipError) -> Self {
        UpdateError::IoError(std::io::Error::other(err))
    }
}
