//! selfup-demo: a small application that keeps itself up to date.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use selfup::{UpdateIntent, UpdateManager, UpdaterConfig};

/// Version compared against the tag of the latest release.
const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Parser)]
#[command(name = "selfup-demo", version, about)]
struct Cli {
    /// Never look for a new release
    #[arg(long)]
    dont_upgrade: bool,

    /// Look for a new release even if one was checked today
    #[arg(long)]
    force_upgrade: bool,

    /// Install a new release without asking
    #[arg(long)]
    auto_upgrade: bool,

    /// Updater configuration file (TOML)
    #[arg(long, env = "SELFUP_CONFIG")]
    config: Option<PathBuf>,

    /// GitHub owner of the release repository
    #[arg(long, default_value = "acme")]
    owner: String,

    /// GitHub repository publishing the releases
    #[arg(long, default_value = "example-selfup-app")]
    repo: String,
}

impl Cli {
    fn intent(&self) -> UpdateIntent {
        UpdateIntent {
            force_upgrade: self.force_upgrade,
            suppress_upgrade: self.dont_upgrade,
            auto_confirm: self.auto_upgrade,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => UpdaterConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => UpdaterConfig::default(),
    };

    let app_path = std::env::current_exe()
        .or_else(|_| std::env::args().next().map(PathBuf::from).context("no program path"))?;

    match UpdateManager::new(&cli.owner, &cli.repo, CURRENT_VERSION, app_path, config) {
        Ok(manager) => manager.with_intent(cli.intent()).upgrade_when_needed().await,
        Err(e) => warn!("Updates unavailable: {}", e),
    }

    println!("Welcome to selfup-demo version {}", CURRENT_VERSION);
    Ok(())
}
