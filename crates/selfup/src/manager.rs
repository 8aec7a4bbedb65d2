//! Update manager - orchestrates the complete self-update flow.
//!
//! The UpdateManager combines all update components:
//! - UpdateGate and ThrottleStore to decide whether to ask the server at all
//! - ReleaseSource for the latest release metadata
//! - Confirmer to let the user accept or decline the upgrade
//! - InstallPipeline to download, verify and install the release archive
//! - Handoff to swap the running executable once this process exits
//!
//! Every step records an [`UpdateState`]; [`UpdateManager::run`] returns how
//! the attempt ended and never exits the process itself.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::archive::ZipExtractor;
use crate::config::UpdaterConfig;
use crate::download::{Auth, Downloader, ReqwestHttpClient};
use crate::error::UpdateError;
use crate::gate::{FileThrottleStore, ThrottleStore, UpdateGate, UpdateIntent};
use crate::handoff::{Handoff, ShellHandoff};
use crate::install::{InstallPipeline, InstallRequest};
use crate::release::{
    extract_expected_hash, select_platform_asset, GithubReleaseSource, ReleaseSource,
};
use crate::version::Version;

/// Current state of the update flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Nothing started yet
    #[default]
    Idle,
    /// Throttle and flags evaluated
    Gated { proceed: bool },
    /// Asking the release server
    Checking,
    /// The latest release is not newer than the running version
    UpToDate,
    /// Newer release without an asset for this platform
    AssetUnavailable,
    /// Waiting for the user's answer
    AwaitingConfirmation,
    /// The user declined the upgrade
    Declined,
    /// The upgrade was accepted
    Confirmed,
    /// Downloading and installing the release
    Installing,
    /// Replacement scheduled; the process must exit now
    ReadyToReplace,
    /// The process is exiting so the replacement can run
    Terminated,
    /// The attempt failed; the running version keeps going
    Failed(String),
}

/// How an update attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No check was made (suppressed or throttled)
    Skipped,
    UpToDate,
    AssetUnavailable,
    Declined,
    /// The new executable is installed and a detached replacement is
    /// scheduled. The caller must exit promptly.
    ReadyToReplace { new_executable: PathBuf },
}

/// A newer release offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOffer {
    pub owner: String,
    pub repo: String,
    pub current: Version,
    pub latest: Version,
    pub title: String,
    pub body: String,
}

impl UpdateOffer {
    /// Human-readable announcement: versions, then the release title
    /// underlined with `^`, then the release notes.
    pub fn render(&self) -> String {
        format!(
            "{}/{} version available.\ncurrent version : {}\nnew version : {}\n\n{}\n{}\n{}\n",
            self.owner,
            self.repo,
            self.current,
            self.latest,
            self.title,
            "^".repeat(self.title.chars().count()),
            self.body
        )
    }
}

/// Asks whether an offered upgrade should be installed.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, offer: &UpdateOffer) -> Result<bool, UpdateError>;
}

/// Prompt used by [`StdinConfirmer`].
pub const CONFIRM_PROMPT: &str = "Do you want to perform the upgrade ? [y]es or [n]o.";

/// [`Confirmer`] that prints the offer to stdout and reads one line from
/// stdin. Anything not starting with `y` (including end of input) declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, offer: &UpdateOffer) -> Result<bool, UpdateError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", offer.render())?;
        writeln!(stdout, "{}", CONFIRM_PROMPT)?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    answer
        .trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'y'))
}

/// Main update manager that orchestrates the complete update flow.
///
/// # Example
///
/// ```ignore
/// use selfup::{UpdateManager, UpdaterConfig};
///
/// let manager = UpdateManager::new(
///     "acme",
///     "tool",
///     "v1.2.0",
///     std::env::args().next().unwrap_or_default(),
///     UpdaterConfig::default(),
/// )?;
///
/// // Returns only when no replacement was scheduled
/// manager.upgrade_when_needed().await;
/// ```
pub struct UpdateManager {
    owner: String,
    repo: String,
    current_version: Version,
    /// Path of the running executable
    app_path: PathBuf,
    intent: UpdateIntent,
    config: UpdaterConfig,
    gate: UpdateGate,
    store: Arc<dyn ThrottleStore>,
    source: Arc<dyn ReleaseSource>,
    pipeline: InstallPipeline,
    confirmer: Arc<dyn Confirmer>,
    handoff: Arc<dyn Handoff>,
    state: Arc<RwLock<UpdateState>>,
}

impl UpdateManager {
    /// Create an update manager using the production collaborators: the
    /// GitHub release API, reqwest downloads, zip extraction, a stdin prompt
    /// and a shell handoff. The intent is read from the process arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        current_version: &str,
        app_path: impl Into<PathBuf>,
        config: UpdaterConfig,
    ) -> Result<Self, UpdateError> {
        let owner = owner.into();
        let repo = repo.into();

        let store = FileThrottleStore::new(config.state_root());
        let source = GithubReleaseSource::with_api_base(config.api_base.clone())?;
        let downloader = Downloader::new(Arc::new(ReqwestHttpClient::new()?))
            .with_max_retries(config.max_download_retries);
        let pipeline = InstallPipeline::new(downloader, Arc::new(ZipExtractor::new()))
            .with_install_marker(config.use_install_marker);

        Ok(Self {
            current_version: Version::parse(current_version),
            app_path: app_path.into(),
            intent: UpdateIntent::from_env(),
            gate: UpdateGate::new(config.check_interval()),
            store: Arc::new(store),
            source: Arc::new(source),
            pipeline,
            confirmer: Arc::new(StdinConfirmer),
            handoff: Arc::new(ShellHandoff::new()),
            state: Arc::new(RwLock::new(UpdateState::Idle)),
            owner,
            repo,
            config,
        })
    }

    pub fn with_intent(mut self, intent: UpdateIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_throttle_store(mut self, store: Arc<dyn ThrottleStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_release_source(mut self, source: Arc<dyn ReleaseSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_pipeline(mut self, pipeline: InstallPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn Handoff>) -> Self {
        self.handoff = handoff;
        self
    }

    /// Get the current state of the update flow.
    pub async fn state(&self) -> UpdateState {
        self.state.read().await.clone()
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub fn intent(&self) -> &UpdateIntent {
        &self.intent
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Directory holding downloads and installed releases.
    pub fn work_dir(&self) -> PathBuf {
        self.config.work_dir_for(&self.owner, &self.repo)
    }

    async fn set_state(&self, state: UpdateState) {
        debug!(?state, "Update state changed");
        *self.state.write().await = state;
    }

    /// Check for, offer and install a newer release.
    ///
    /// On success with [`UpdateOutcome::ReadyToReplace`] the replacement is
    /// already scheduled and the caller must exit. On error the state is
    /// [`UpdateState::Failed`] and the running version is untouched.
    pub async fn run(&self) -> Result<UpdateOutcome, UpdateError> {
        self.set_state(UpdateState::Idle).await;
        match self.run_flow().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.set_state(UpdateState::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn run_flow(&self) -> Result<UpdateOutcome, UpdateError> {
        let now = chrono::Utc::now().timestamp();
        let last_check = match self.store.load_timestamp(&self.owner, &self.repo) {
            Ok(last_check) => last_check,
            Err(e) => {
                warn!("Failed to read last update check: {}", e);
                None
            }
        };

        let proceed = self.gate.should_check(now, last_check, &self.intent);
        self.set_state(UpdateState::Gated { proceed }).await;
        if !proceed {
            debug!(
                suppressed = self.intent.suppress_upgrade,
                last_check, "Skipping update check"
            );
            return Ok(UpdateOutcome::Skipped);
        }

        self.set_state(UpdateState::Checking).await;
        let fetched = self
            .source
            .fetch_latest_release(&self.owner, &self.repo)
            .await;

        // Every check that reached the server counts for the throttle,
        // including ones answered with an error status or a bad body
        if !matches!(fetched, Err(UpdateError::NetworkError(_))) {
            if let Err(e) = self.store.save_timestamp(&self.owner, &self.repo, now) {
                warn!("Failed to record update check: {}", e);
            }
        }
        let release = fetched?;

        let remote = Version::parse(&release.tag);
        info!("current ver : {}", self.current_version);
        info!("remote ver : {}", remote);
        if remote <= self.current_version {
            info!("{}/{} is up to date", self.owner, self.repo);
            self.set_state(UpdateState::UpToDate).await;
            return Ok(UpdateOutcome::UpToDate);
        }

        let Some(asset) = select_platform_asset(&release.assets) else {
            info!(
                "{} has no asset for this platform, staying on {}",
                remote, self.current_version
            );
            self.set_state(UpdateState::AssetUnavailable).await;
            return Ok(UpdateOutcome::AssetUnavailable);
        };

        if !self.intent.auto_confirm {
            self.set_state(UpdateState::AwaitingConfirmation).await;
            let offer = UpdateOffer {
                owner: self.owner.clone(),
                repo: self.repo.clone(),
                current: self.current_version.clone(),
                latest: remote.clone(),
                title: release.title.clone(),
                body: release.body.clone(),
            };
            let confirmer = self.confirmer.clone();
            let accepted = tokio::task::spawn_blocking(move || confirmer.confirm(&offer))
                .await
                .map_err(|e| UpdateError::IoError(io::Error::other(e)))??;
            if !accepted {
                info!("Upgrade to {} declined", remote);
                self.set_state(UpdateState::Declined).await;
                return Ok(UpdateOutcome::Declined);
            }
        }
        self.set_state(UpdateState::Confirmed).await;

        let expected_hash = extract_expected_hash(&release.body, &asset.name);
        match &expected_hash {
            Some(hash) => info!("expected sha1 : {}", hash),
            None => warn!(
                "No hash published for {}, installing without verification",
                asset.name
            ),
        }
        let verify_hash = self.config.verify_hash && expected_hash.is_some();

        let work_dir = self.work_dir();
        let destination = work_dir.join(remote.as_str());
        let request = InstallRequest::new(
            remote.as_str(),
            asset.download_url.as_str(),
            &destination,
            work_dir.join("downloads"),
        )
        .with_expected_hash(expected_hash)
        .with_archive_subdir(self.config.archive_subdir.clone())
        .with_verify_hash(verify_hash)
        .with_auth(self.config.auth_token.clone().map(Auth::Bearer))
        .with_message(format!("Downloading {}", remote));

        self.set_state(UpdateState::Installing).await;
        self.pipeline.install(&request).await?;

        let new_executable = replacement_path(&destination, &self.app_path)?;
        self.handoff
            .schedule(&self.app_path, &new_executable, self.config.handoff_delay())?;

        self.set_state(UpdateState::ReadyToReplace).await;
        Ok(UpdateOutcome::ReadyToReplace { new_executable })
    }

    /// Best-effort update on startup.
    ///
    /// Failures are logged and swallowed so the application keeps running
    /// its current version. When a replacement was scheduled the process
    /// exits with status 0 and this never returns.
    pub async fn upgrade_when_needed(&self) {
        match self.run().await {
            Ok(UpdateOutcome::ReadyToReplace { new_executable }) => {
                self.set_state(UpdateState::Terminated).await;
                info!(
                    "We will close, the next start runs {}",
                    new_executable.display()
                );
                std::process::exit(0);
            }
            Ok(outcome) => debug!(?outcome, "Update check finished"),
            Err(e) => warn!("Update attempt failed: {}", e.diagnostic()),
        }
    }
}

/// The installed counterpart of `app_path` inside `destination`.
fn replacement_path(destination: &Path, app_path: &Path) -> Result<PathBuf, UpdateError> {
    let file_name = app_path.file_name().ok_or_else(|| {
        UpdateError::InvalidHandoff(format!(
            "{} does not name an executable",
            app_path.display()
        ))
    })?;
    Ok(destination.join(file_name))
}
