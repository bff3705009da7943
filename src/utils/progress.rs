//! Progress indicators for the console front-end
//!
//! A thin wrapper around `indicatif` with consistent styling and a kill
//! switch for automation. The console implementations of the host traits use
//! these bars for both the in-app progress indicator and the stand-in for
//! the system notification entry.
//!
//! # Environment Variables
//!
//! - `AIRLIFT_NO_PROGRESS`: set to any value to disable all progress
//!   indicators (CI, pipes, scripts). Disabled bars silently ignore every
//!   operation.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Checks if progress bars should be disabled.
fn is_progress_disabled() -> bool {
    std::env::var("AIRLIFT_NO_PROGRESS").is_ok()
}

/// A progress bar with consistent styling
///
/// Wraps `indicatif` with the crate's default look. Honors the
/// `AIRLIFT_NO_PROGRESS` environment variable by constructing hidden bars.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Create a progress bar tracking `len` work units
    #[must_use]
    pub fn new(len: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            bar.set_style(default_style());
            bar
        };
        Self { inner: bar }
    }

    /// Create a spinner for indeterminate work
    #[must_use]
    pub fn new_spinner() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { inner: bar }
    }

    /// Set the message displayed alongside the bar
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Set the prefix displayed before the bar
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Move the bar to an absolute position
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finish the bar, leaving a final message behind
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish the bar and remove it from the terminal
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
