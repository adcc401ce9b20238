//! `kubelens-updater check`

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::config::UpdaterConfig;
use crate::update::asset::select_asset;
use crate::update::release::ReleaseClient;
use crate::utils::platform::PlatformTarget;

/// Resolve the latest release and report the build for this platform.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Installed version to compare against (e.g. "1.1.0" or "v1.1.0")
    #[arg(long, value_name = "VERSION")]
    current: Option<String>,

    /// Check for another platform, as `<os>/<arch>` (e.g. "darwin/arm64")
    #[arg(long, value_name = "OS/ARCH")]
    platform: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Machine-readable result of `check --json`.
#[derive(Debug, Serialize)]
struct CheckReport {
    latest: String,
    release_url: String,
    platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
    update_available: bool,
}

impl CheckCommand {
    pub async fn execute(self, config: &UpdaterConfig) -> Result<()> {
        let target = match &self.platform {
            Some(value) => parse_platform(value)?,
            None => PlatformTarget::current(),
        };

        if !self.json {
            println!("{}", "Checking for updates...".cyan());
        }
        let client =
            ReleaseClient::new(config.releases_url.clone(), &config.user_agent, config.release_timeout())?;
        let release = client.fetch_latest().await?;
        let asset = select_asset(&release, &target);
        let update_available = match &self.current {
            Some(current) => asset.is_some() && release.is_newer_than(current),
            None => asset.is_some(),
        };

        if self.json {
            let report = CheckReport {
                latest: release.version().to_string(),
                release_url: release.html_url.clone(),
                platform: target.to_string(),
                asset: asset.map(|a| a.name.clone()),
                current: self.current.clone(),
                update_available,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Latest release: {} ({})", release.version().bold(), release.html_url);
        match asset {
            Some(asset) => println!("Build for {}: {} ({} bytes)", target, asset.name, asset.size),
            None => println!("{}", format!("No build published for {target}").yellow()),
        }

        if let Some(current) = &self.current {
            if update_available {
                println!(
                    "{}",
                    format!("Update available: {} -> {}", current, release.version()).green()
                );
                println!("Run `kubelens-updater update` to install it");
            } else {
                println!("{}", format!("You are on the latest version ({current})").green());
            }
        }
        Ok(())
    }
}

fn parse_platform(value: &str) -> Result<PlatformTarget> {
    match value.split_once('/') {
        Some((os, arch)) if !os.is_empty() && !arch.is_empty() => Ok(PlatformTarget::new(os, arch)),
        _ => bail!("Invalid platform '{value}': expected <os>/<arch>, e.g. linux/amd64"),
    }
}
