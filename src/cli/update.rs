//! `kubelens-updater update`
//!
//! Runs the full pipeline in the foreground: startup cleanup, download with a progress bar,
//! verification, apply and (unless told otherwise) relaunch. Ctrl-C cancels the download;
//! once the apply has started it runs to completion.

use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::UpdaterConfig;
use crate::update::{UpdateState, Updater, startup_cleanup};
use crate::utils::progress::DownloadProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Download, verify and install the latest release.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Stop once the verified download is on disk
    #[arg(long)]
    download_only: bool,

    /// Install but do not restart into the new version
    #[arg(long, conflicts_with = "download_only")]
    no_relaunch: bool,
}

impl UpdateCommand {
    pub async fn execute(self, config: &UpdaterConfig, no_progress: bool) -> Result<()> {
        let report = startup_cleanup(config);
        debug!("Startup cleanup removed {} paths", report.removed.len());

        let updater = Updater::new(config)?;
        let shutdown = CancellationToken::new();
        let ctrl_c = {
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        println!("{}", "Checking for updates...".cyan());
        updater.start_download(&shutdown)?;

        let progress = if no_progress {
            DownloadProgress::hidden()
        } else {
            DownloadProgress::new("Downloading")
        };
        loop {
            let status = updater.status();
            if status.state != UpdateState::Downloading {
                break;
            }
            progress.set_fraction(status.progress);
            if !status.version.is_empty() {
                progress.set_message(format!("v{}", status.version));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        updater.wait().await;
        ctrl_c.abort();

        let status = updater.status();
        if status.state != UpdateState::Ready {
            progress.finish_and_clear();
            return Err(match updater.last_error() {
                Some(error) => error.into(),
                None => anyhow!("Update stopped in the {} state", status.state),
            });
        }
        progress.finish_with_message(format!("v{} verified", status.version));

        if self.download_only {
            if let Some(asset) = updater.downloaded_asset() {
                println!("{}", format!("Downloaded {}", asset.display()).green());
            }
            return Ok(());
        }

        println!("{}", format!("Installing version {}...", status.version).cyan());
        updater.apply().await?;
        println!("{}", format!("Kubelens {} installed", status.version).green());

        if self.no_relaunch {
            return Ok(());
        }
        println!("Restarting Kubelens...");
        match updater.relaunch()? {}
    }
}
