//! The `check` command: one-shot version query without UI or download

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::config::UpdateConfig;
use crate::model::UpdateModel;
use crate::query::{VersionClient, VersionQuery};
use crate::utils::progress::ProgressBar;

/// Command-line arguments for `airlift check`
///
/// Performs a single version check against the configured endpoint and
/// prints the result. Nothing is downloaded and no state is changed.
///
/// ```bash
/// airlift check --build 42
/// airlift check --build 42 --endpoint https://updates.example.com/api/version
/// ```
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Build number of the running application
    #[arg(long)]
    pub build: u64,

    /// Override the configured update endpoint
    #[arg(long)]
    pub endpoint: Option<String>,
}

impl CheckArgs {
    /// Execute the check command
    pub async fn execute(self, mut config: UpdateConfig) -> Result<()> {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Checking for updates...");

        let client = VersionClient::from_config(&config)?;
        let result = client.fetch_version(self.build).await;
        spinner.finish_and_clear();

        let doc = result?;
        let model = UpdateModel::from_wire(doc, self.build);

        if model.needs_upgrade {
            println!(
                "{} build {} is available (running {}){}",
                "Update available:".green().bold(),
                model.latest_build,
                model.current_build,
                if model.must_upgrade {
                    " [mandatory]".red().bold().to_string()
                } else {
                    String::new()
                }
            );
            if !model.description.is_empty() {
                println!("  {}", model.description);
            }
        } else {
            println!(
                "{} (build {})",
                "Already on the latest build".green(),
                model.current_build
            );
        }

        Ok(())
    }
}
