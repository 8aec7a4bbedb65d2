//! Update check gating.
//!
//! Decides whether a remote check runs at all, from the command-line intent
//! flags and the time elapsed since the last check that reached the server.
//! Check timestamps are kept in a [`ThrottleStore`] so the throttle holds
//! across process invocations.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::UpdateError;

/// Suppresses every update check.
pub const DONT_UPGRADE_FLAG: &str = "--dont-upgrade";
/// Checks even when the throttle interval has not elapsed.
pub const FORCE_UPGRADE_FLAG: &str = "--force-upgrade";
/// Installs without asking for confirmation.
pub const AUTO_UPGRADE_FLAG: &str = "--auto-upgrade";

/// Name of the file holding the last check timestamp.
const LAST_CHECK_FILE: &str = "last-check";

/// What the user asked for on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateIntent {
    pub force_upgrade: bool,
    pub suppress_upgrade: bool,
    pub auto_confirm: bool,
}

impl UpdateIntent {
    /// Derive the intent from process arguments. Unknown arguments are
    /// ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut intent = Self::default();
        for arg in args {
            match arg.as_ref() {
                DONT_UPGRADE_FLAG => intent.suppress_upgrade = true,
                FORCE_UPGRADE_FLAG => intent.force_upgrade = true,
                AUTO_UPGRADE_FLAG => intent.auto_confirm = true,
                _ => {}
            }
        }
        intent
    }

    /// Derive the intent from the arguments of the current process.
    pub fn from_env() -> Self {
        Self::from_args(std::env::args().skip(1))
    }
}

/// Decides whether a remote update check should run.
#[derive(Debug, Clone, Copy)]
pub struct UpdateGate {
    interval: Duration,
}

impl UpdateGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when a check should run.
    ///
    /// A forced upgrade always checks; otherwise a suppressed upgrade never
    /// does; otherwise a check runs when none was recorded or at least the
    /// interval has elapsed since `last_check`. Timestamps are seconds since
    /// the epoch. A recorded check in the future counts as stale.
    pub fn should_check(&self, now: i64, last_check: Option<i64>, intent: &UpdateIntent) -> bool {
        if intent.force_upgrade {
            return true;
        }
        if intent.suppress_upgrade {
            return false;
        }

        match last_check {
            None => true,
            Some(last) if last > now => true,
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                let interval = i64::try_from(self.interval.as_secs()).unwrap_or(i64::MAX);
                elapsed >= interval
            }
        }
    }
}

impl Default for UpdateGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

/// Persisted last-check timestamps, keyed by `(owner, repo)`.
pub trait ThrottleStore: Send + Sync {
    /// Timestamp of the last check that reached the server, if any.
    fn load_timestamp(&self, owner: &str, repo: &str) -> Result<Option<i64>, UpdateError>;

    /// Record a check that reached the server.
    fn save_timestamp(&self, owner: &str, repo: &str, timestamp: i64) -> Result<(), UpdateError>;
}

/// Throttle store keeping one timestamp file per `(owner, repo)`.
///
/// # Directory Structure
///
/// ```text
/// root/
/// └── <owner>/
///     └── <repo>/
///         └── last-check      # decimal seconds since the epoch
/// ```
#[derive(Debug, Clone)]
pub struct FileThrottleStore {
    root: PathBuf,
}

impl FileThrottleStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the timestamp file for `owner/repo`.
    pub fn timestamp_path(&self, owner: &str, repo: &str) -> PathBuf {
        self.root.join(owner).join(repo).join(LAST_CHECK_FILE)
    }
}

impl ThrottleStore for FileThrottleStore {
    fn load_timestamp(&self, owner: &str, repo: &str) -> Result<Option<i64>, UpdateError> {
        let path = self.timestamp_path(owner, repo);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match content.trim().parse::<i64>() {
            Ok(timestamp) => Ok(Some(timestamp)),
            Err(_) => {
                warn!(path = %path.display(), "Ignoring unreadable check timestamp");
                Ok(None)
            }
        }
    }

    fn save_timestamp(&self, owner: &str, repo: &str, timestamp: i64) -> Result<(), UpdateError> {
        let path = self.timestamp_path(owner, repo);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, timestamp.to_string())?;
        debug!(path = %path.display(), timestamp, "Recorded update check");
        Ok(())
    }
}
