//! Release metadata and asset selection.
//!
//! A [`ReleaseSource`] returns the latest published release of a project;
//! the selector functions pick the asset built for this platform and the
//! content hash published for it in the release notes.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_API_BASE;
use crate::error::UpdateError;

/// Number of hex characters in a published content hash.
pub const HASH_HEX_LEN: usize = 40;

/// Default timeout for metadata requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Platform token matched against asset names, fixed at compile time.
#[cfg(target_os = "linux")]
pub const PLATFORM_TOKEN: &str = "linux";
#[cfg(target_os = "macos")]
pub const PLATFORM_TOKEN: &str = "macos";
#[cfg(target_os = "windows")]
pub const PLATFORM_TOKEN: &str = "windows";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const PLATFORM_TOKEN: &str = "unsupported";

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
}

impl Asset {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
        }
    }
}

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Version tag, e.g. `v1.3.0`
    pub tag: String,
    /// Human readable title
    pub title: String,
    /// Free-text release notes
    pub body: String,
    /// Attached files in publication order
    pub assets: Vec<Asset>,
}

/// Source of release metadata.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest release of `owner/repo`.
    async fn fetch_latest_release(&self, owner: &str, repo: &str)
        -> Result<ReleaseInfo, UpdateError>;
}

/// Pick the first asset whose lower-cased name contains `platform_token`.
pub fn select_asset<'a>(assets: &'a [Asset], platform_token: &str) -> Option<&'a Asset> {
    let token = platform_token.to_lowercase();
    assets
        .iter()
        .find(|asset| asset.name.to_lowercase().contains(&token))
}

/// Pick the asset built for the platform this crate was compiled for.
pub fn select_platform_asset(assets: &[Asset]) -> Option<&Asset> {
    select_asset(assets, PLATFORM_TOKEN)
}

/// Find the content hash published for `asset_name` in release notes.
///
/// Notes list hashes as `<asset name>:<40 hex chars>`. The hash is returned
/// lower-cased; `None` means the release does not publish one.
///
/// A hex run longer than 40 characters is skipped rather than truncated to
/// its first 40, since it is some other digest (SHA-256, say) and would
/// never match the downloaded content.
pub fn extract_expected_hash(body: &str, asset_name: &str) -> Option<String> {
    let pattern = format!(
        r"{}:([0-9A-Fa-f]{{{}}})",
        regex::escape(asset_name),
        HASH_HEX_LEN
    );
    let regex = Regex::new(&pattern).ok()?;

    for captures in regex.captures_iter(body) {
        let Some(hash) = captures.get(1) else {
            continue;
        };
        let trailing = body[hash.end()..].chars().next();
        if trailing.is_some_and(|c| c.is_ascii_hexdigit()) {
            continue;
        }
        return Some(hash.as_str().to_lowercase());
    }
    None
}

/// Latest-release response of the GitHub REST API.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
}

impl From<GithubRelease> for ReleaseInfo {
    fn from(release: GithubRelease) -> Self {
        Self {
            title: release.name.unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            body: release.body.unwrap_or_default(),
            assets: release
                .assets
                .into_iter()
                .map(|asset| Asset::new(asset.name, asset.browser_download_url))
                .collect(),
        }
    }
}

/// Release source backed by the GitHub releases API.
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_base: String,
}

impl GithubReleaseSource {
    /// Create a source talking to `api.github.com`.
    pub fn new() -> Result<Self, UpdateError> {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Create a source talking to a GitHub compatible API at `api_base`.
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(format!("selfup/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of the latest-release endpoint for `owner/repo`.
    pub fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo)
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn fetch_latest_release(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<ReleaseInfo, UpdateError> {
        let url = self.latest_release_url(owner, repo);
        debug!("Fetching latest release from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| UpdateError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::DownloadFailed {
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let release: GithubRelease = serde_json::from_slice(&bytes)?;
        Ok(release.into())
    }
}
