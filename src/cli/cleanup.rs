//! `kubelens-updater cleanup`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::config::UpdaterConfig;
use crate::update::startup_cleanup;

/// Remove leftovers from earlier updates.
#[derive(Args, Debug)]
pub struct CleanupCommand {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl CleanupCommand {
    pub fn execute(self, config: &UpdaterConfig) -> Result<()> {
        let report = startup_cleanup(config);

        if self.json {
            let json = serde_json::json!({
                "removed": report.removed,
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        if report.is_empty() {
            println!("{}", "Nothing to clean up".green());
            return Ok(());
        }
        for path in &report.removed {
            println!("{} {}", "Removed".green(), path.display());
        }
        for warning in &report.warnings {
            eprintln!("{} {}", "warning:".yellow(), warning);
        }
        Ok(())
    }
}
