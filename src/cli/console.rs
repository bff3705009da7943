//! Console implementations of the host boundary
//!
//! The CLI is a complete host for the update system: dialogs become stdin
//! prompts, the in-app progress indicator becomes an indicatif bar, the
//! system notification entry becomes debug-level log lines, and the
//! installer handoff is logged rather than launched. Real applications
//! provide their own implementations of the same traits.

use async_trait::async_trait;
use colored::Colorize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::core::UpdateError;
use crate::host::{
    HostHandle, Installer, MeteredChoice, NetworkKind, NetworkMonitor, PromptChoice,
    StatusNotifier, UpdateFrontend,
};
use crate::model::UpdateModel;
use crate::utils::progress::ProgressBar;

async fn read_line() -> String {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line
    })
    .await
    .unwrap_or_default()
}

/// Interactive stdin/stdout frontend
///
/// With `assume_yes` every prompt is answered affirmatively without
/// blocking, which is what `--yes` maps to.
pub struct ConsoleFrontend {
    assume_yes: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleFrontend {
    /// Create a frontend; `assume_yes` suppresses interactive prompts
    #[must_use]
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            bar: Mutex::new(None),
        }
    }
}

#[async_trait]
impl UpdateFrontend for ConsoleFrontend {
    async fn prompt_update(&self, model: &UpdateModel, cancelable: bool) -> PromptChoice {
        println!();
        println!(
            "{} build {} is available (running {})",
            "Update:".cyan().bold(),
            model.latest_build,
            model.current_build
        );
        if !model.description.is_empty() {
            println!("  {}", model.description);
        }

        if self.assume_yes {
            return PromptChoice::UpdateNow;
        }

        if !cancelable {
            println!("{}", "This update is mandatory.".yellow());
            println!("Press Enter to update now");
            let _ = read_line().await;
            return PromptChoice::UpdateNow;
        }

        println!("Update now? [y/N]");
        let line = read_line().await;
        if line.trim().eq_ignore_ascii_case("y") {
            PromptChoice::UpdateNow
        } else {
            PromptChoice::Later
        }
    }

    async fn confirm_metered(&self) -> MeteredChoice {
        if self.assume_yes {
            return MeteredChoice::Proceed;
        }

        println!(
            "{}",
            "You are not on Wi-Fi; downloading will use metered data.".yellow()
        );
        println!("Continue anyway? [y/N]");
        let line = read_line().await;
        if line.trim().eq_ignore_ascii_case("y") {
            MeteredChoice::Proceed
        } else {
            MeteredChoice::Defer
        }
    }

    fn toast(&self, message: &str) {
        println!("{}", message.dimmed());
    }

    fn download_started(&self, blocking: bool) {
        let bar = ProgressBar::new(100);
        bar.set_prefix("⬇");
        bar.set_message(if blocking {
            "Downloading mandatory update"
        } else {
            "Downloading update"
        });
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn download_progress(&self, fraction: f32, _total_bytes: u64) {
        if let Some(bar) = &*self.bar.lock().unwrap() {
            bar.set_position((fraction.clamp(0.0, 1.0) * 100.0) as u64);
        }
    }

    fn download_finished(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

/// Stand-in for the system notification facility
///
/// A terminal has no notification shade; the persistent entry becomes
/// debug-level log lines so `--verbose` shows exactly what a platform
/// notifier would have displayed.
pub struct ConsoleNotifier;

impl StatusNotifier for ConsoleNotifier {
    fn publish(&self, title: &str, percent: u8) {
        debug!(percent, "notification: {title}");
    }

    fn clear(&self) {
        debug!("notification cleared");
    }
}

/// Installer that reports the handoff instead of launching one
pub struct ConsoleInstaller;

#[async_trait]
impl Installer for ConsoleInstaller {
    async fn install(&self, path: &Path, mime: &str) -> Result<(), UpdateError> {
        info!(artifact = %path.display(), mime, "Handing artifact to the installer");
        println!(
            "{} {}",
            "Downloaded update ready to install:".green(),
            path.display()
        );
        Ok(())
    }
}

/// Process-level host services for the CLI
pub struct ConsoleHost;

impl HostHandle for ConsoleHost {
    fn raise_keepalive(&self) {
        debug!("foreground keepalive raised");
    }

    fn clear_keepalive(&self) {
        debug!("foreground keepalive cleared");
    }

    fn exit_app(&self) {
        eprintln!("{}", "A mandatory update was declined; exiting.".red());
        std::process::exit(1);
    }
}

/// Network oracle fixed by a CLI flag
///
/// A terminal process cannot classify the device's network, so the kind is
/// supplied explicitly (`--network wifi|metered`).
pub struct FixedNetwork(pub NetworkKind);

impl NetworkMonitor for FixedNetwork {
    fn network_kind(&self) -> NetworkKind {
        self.0
    }
}
