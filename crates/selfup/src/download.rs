//! Archive downloader.
//!
//! Fetches release archives into a local cache with bounded retries and
//! content hash verification.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::artifact;
use crate::error::UpdateError;

/// Default timeout for HTTP connections in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout for streaming downloads in seconds.
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Default number of attempts allowed after the first one.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Credentials sent with a download request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// `Authorization: Bearer <token>`
    Bearer(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Auth::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP transport used for downloads.
///
/// Any status code is a successful exchange; `Err` means the request never
/// completed (connection refused, timeout, broken stream...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, auth: Option<&Auth>) -> Result<HttpResponse, UpdateError>;
}

/// Configuration for the reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout in seconds.
    pub timeout_secs: u64,
    /// Read timeout for streaming in seconds.
    pub read_timeout_secs: u64,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: format!("selfup/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`HttpClient`] backed by reqwest.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with default timeouts.
    pub fn new() -> Result<Self, UpdateError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, auth: Option<&Auth>) -> Result<HttpResponse, UpdateError> {
        let mut request = self.client.get(url);
        request = match auth {
            Some(Auth::Basic { username, password }) => request.basic_auth(username, Some(password)),
            Some(Auth::Bearer(token)) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| UpdateError::NetworkError(e.to_string()))?;
        let status = response.status().as_u16();

        // Stream the response body
        let mut stream = response.bytes_stream();
        let mut body = BytesMut::new();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| UpdateError::NetworkError(e.to_string()))?;
            body.extend_from_slice(&chunk);
        }

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse {
            status,
            body: body.freeze(),
        })
    }
}

/// Downloads archives into the local cache.
///
/// A transport error, a non-200 status and (when a hash is expected) a
/// content hash mismatch each consume one retry from a single budget.
/// Once the budget is spent, transport and status failures are errors but
/// mismatching content is accepted and cached with a warning: integrity is
/// best-effort, not a gate.
#[derive(Clone)]
pub struct Downloader {
    client: Arc<dyn HttpClient>,
    max_retries: u32,
}

impl Downloader {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the number of attempts allowed after the first one.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fetch `url`, retrying on failure and on hash mismatch.
    pub async fn fetch(
        &self,
        url: &str,
        auth: Option<&Auth>,
        expected_hash: Option<&str>,
    ) -> Result<Bytes, UpdateError> {
        let mut retries_left = self.max_retries;

        loop {
            debug!("Downloading {}", url);
            let failure = match self.client.get(url, auth).await {
                Err(e) => e,
                Ok(response) if !response.is_ok() => UpdateError::DownloadFailed {
                    status: response.status,
                },
                Ok(response) => {
                    let Some(expected) = expected_hash else {
                        return Ok(response.body);
                    };

                    let actual = artifact::content_hash(&response.body);
                    if artifact::hashes_match(&actual, expected) {
                        return Ok(response.body);
                    }

                    if retries_left == 0 {
                        warn!(
                            url,
                            expected,
                            actual = %actual,
                            "Hash still mismatched after all retries, keeping last download"
                        );
                        return Ok(response.body);
                    }

                    UpdateError::HashMismatch {
                        expected: expected.to_ascii_lowercase(),
                        actual,
                    }
                }
            };

            if retries_left == 0 {
                warn!("[{}]: download failed, giving up: {}", url, failure);
                return Err(failure);
            }

            warn!(
                "[{}]: download error ({}), retrying {} more times",
                url, failure, retries_left
            );
            retries_left -= 1;
        }
    }

    /// Make sure `cache_path` holds the archive at `url`.
    ///
    /// Returns `true` when a download happened, `false` when the cached file
    /// was already valid.
    pub async fn download_to_cache(
        &self,
        url: &str,
        auth: Option<&Auth>,
        cache_path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<bool, UpdateError> {
        info!("Checking if {} is up-to-date", cache_path.display());
        if artifact::is_cache_valid(cache_path, expected_hash)? {
            debug!("Using cached archive {}", cache_path.display());
            return Ok(false);
        }

        info!("Downloading {} as {}", url, cache_path.display());
        let body = self.fetch(url, auth, expected_hash).await?;

        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(cache_path, &body)?;

        info!("Download complete: {} bytes", body.len());
        Ok(true)
    }
}
