//! Terminal progress display for the CLI.
//!
//! Wraps `indicatif` with the download style used by `kubelens-updater update`. Bars are
//! hidden when `KUBELENS_NO_PROGRESS` is set or stderr is not a terminal.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Whether progress output is disabled for this process.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os("KUBELENS_NO_PROGRESS").is_some() || !std::io::stderr().is_terminal()
}

/// Progress bar measured in bytes.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// Creates a byte bar. The length is filled in once the status reports progress.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let inner = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(PERCENT_SCALE);
            bar.set_style(download_style());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        inner.set_prefix(prefix.into());
        Self {
            inner,
        }
    }

    /// A bar that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Updates the bar from a fraction in `[0, 1]`.
    pub fn set_fraction(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.inner.set_position((clamped * PERCENT_SCALE as f64).round() as u64);
    }

    /// Sets the trailing message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Finishes the bar leaving `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Removes the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

const PERCENT_SCALE: u64 = 1000;

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}
