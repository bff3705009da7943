//! The `update` command: the full coordinated check/prompt/download cycle

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::sync::Arc;

use crate::cli::console::{
    ConsoleFrontend, ConsoleHost, ConsoleInstaller, ConsoleNotifier, FixedNetwork,
};
use crate::config::{PolicyConfig, UpdateConfig};
use crate::connection::WorkerService;
use crate::coordinator::UpdateCoordinator;
use crate::core::CheckOutcome;
use crate::host::{NetworkKind, UpdateRuntime};

/// Network kind reported to the metered-data policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkArg {
    /// Unmetered connection; downloads start immediately
    Wifi,
    /// Metered connection; a confirmation interposes before the download
    Metered,
}

/// Command-line arguments for `airlift update`
///
/// Runs one complete update cycle: check, policy, prompts, download, and
/// installer handoff, with the console standing in for the host UI.
///
/// ```bash
/// airlift update --build 42                 # interactive
/// airlift update --build 42 --yes           # accept all prompts
/// airlift update --build 42 --network metered
/// ```
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Build number of the running application
    #[arg(long)]
    pub build: u64,

    /// Override the configured update endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Answer yes to every prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Skip the decision prompt for non-mandatory updates
    #[arg(long)]
    pub no_prompt: bool,

    /// Network kind reported to the download policy
    #[arg(long, value_enum, default_value_t = NetworkArg::Wifi)]
    pub network: NetworkArg,
}

impl UpdateArgs {
    /// Execute the update command
    pub async fn execute(self, mut config: UpdateConfig) -> Result<()> {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        config.policy = PolicyConfig {
            show_prompt_on_non_mandatory: !self.no_prompt,
            toast_on_no_update: true,
        };

        let network_kind = match self.network {
            NetworkArg::Wifi => NetworkKind::Wifi,
            NetworkArg::Metered => NetworkKind::Metered,
        };

        // Process start is the well-defined reset point for the
        // cancellation flag
        let runtime = UpdateRuntime::new();
        runtime.reset_cancel_flag();

        let host = Arc::new(ConsoleHost);
        let service = WorkerService::with_http(
            Arc::new(config),
            Arc::new(ConsoleNotifier),
            Arc::new(ConsoleInstaller),
            Arc::clone(&host) as _,
        )?;

        let coordinator = UpdateCoordinator::new(
            service,
            runtime,
            Arc::new(ConsoleFrontend::new(self.yes)),
            Arc::new(FixedNetwork(network_kind)),
            host as _,
            self.build,
        );

        match coordinator.start().await {
            Some(CheckOutcome::NoUpdate) => {}
            Some(CheckOutcome::NeedUpdate) => {
                println!("{}", "Update cycle complete".green());
            }
            Some(CheckOutcome::UserCanceled) => {
                println!("{}", "Update skipped".yellow());
            }
            Some(CheckOutcome::CheckFailed) => {
                bail!("update check failed; see the log for details");
            }
            None => {
                println!("{}", "Update check did not run".dimmed());
            }
        }

        Ok(())
    }
}
