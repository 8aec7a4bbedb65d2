//! # selfup
//!
//! Self-update for standalone executables published as GitHub releases.
//!
//! This crate handles:
//! - Deciding when to ask for a new release (daily throttle, CLI flags)
//! - Picking the release asset built for the current platform
//! - Downloading it with retries and SHA-1 verification against the hash
//!   published in the release notes
//! - Installing the archive under a cross-process lock with an atomic
//!   rename into place
//! - Handing the swap of the running executable to a detached shell
//!
//! ## Integrity
//!
//! Verification is best-effort: when every retry returns content that does
//! not match the published hash, the last download is installed anyway and
//! a warning is logged.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod download;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod install;
pub mod lock;
pub mod manager;
pub mod marker;
#[cfg(test)]
mod mock;
#[cfg(test)]
mod proptests;
pub mod release;
pub mod version;

// Re-export main types for convenience
pub use archive::{ArchiveExtractor, ZipExtractor};
pub use config::UpdaterConfig;
pub use download::{Auth, Downloader, HttpClient, HttpResponse, ReqwestHttpClient};
pub use error::UpdateError;
pub use gate::{FileThrottleStore, ThrottleStore, UpdateGate, UpdateIntent};
pub use handoff::{Handoff, ShellHandoff};
pub use install::{InstallOutcome, InstallPipeline, InstallRequest};
pub use lock::InstallLock;
pub use manager::{
    Confirmer, StdinConfirmer, UpdateManager, UpdateOffer, UpdateOutcome, UpdateState,
};
pub use release::{
    extract_expected_hash, select_asset, select_platform_asset, Asset, GithubReleaseSource,
    ReleaseInfo, ReleaseSource, PLATFORM_TOKEN,
};
pub use version::Version;
