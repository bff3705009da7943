//! Configuration for the update coordinator
//!
//! This module handles the user configuration file (`~/.airlift/config.toml`)
//! which stores the update endpoint, transfer tuning, and the UI policy
//! applied when a check result arrives.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.airlift/config.toml`
//! - **Windows**: `%USERPROFILE%\.airlift\config.toml`
//!
//! The location can be overridden with the `AIRLIFT_CONFIG_PATH` environment
//! variable, which is also how tests isolate themselves from a real home
//! directory.
//!
//! # File Format
//!
//! ```toml
//! endpoint = "https://updates.example.com/api/version"
//! platform = "android"
//! query_intent = "needUpgrade"
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//! stall_timeout_secs = 30
//!
//! [policy]
//! show_prompt_on_non_mandatory = true
//! toast_on_no_update = false
//! ```
//!
//! Every field has a default, so a missing or partial file is never an error;
//! only an endpoint-less configuration fails validation when a check is
//! actually attempted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::core::UpdateError;

/// UI policy applied when a check result arrives
///
/// Read at the moment the check result is handled, never earlier, so a host
/// can adjust policy between `start()` and the callback without races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Whether to show the decision prompt for non-mandatory updates
    ///
    /// When `false`, a non-mandatory update releases the connection silently
    /// (the host still receives the `NeedUpdate` outcome). Mandatory updates
    /// always prompt.
    #[serde(default = "default_show_prompt")]
    pub show_prompt_on_non_mandatory: bool,

    /// Whether to surface a "no update available" toast
    ///
    /// Also controls the "check failed" toast; both are informational only.
    #[serde(default)]
    pub toast_on_no_update: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            show_prompt_on_non_mandatory: default_show_prompt(),
            toast_on_no_update: false,
        }
    }
}

fn default_show_prompt() -> bool {
    true
}

/// Update coordinator configuration
///
/// Loaded from `~/.airlift/config.toml` (or `AIRLIFT_CONFIG_PATH`); all
/// fields default sensibly so hosts can also construct one in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Version check endpoint
    ///
    /// The check issues `GET {endpoint}?q={query_intent}&build={n}&client={platform}`.
    /// Empty by default; validated when a check is attempted.
    #[serde(default)]
    pub endpoint: String,

    /// Client platform identifier sent with every check
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Query intent sent as the `q` parameter
    #[serde(default = "default_query_intent")]
    pub query_intent: String,

    /// Directory where downloaded artifacts are cached
    ///
    /// Defaults to the platform cache directory plus `airlift` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// TCP connect timeout for all HTTP requests, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall timeout for the version check request, in seconds
    ///
    /// Applies to the check only; artifact downloads are bounded by the
    /// stall detector, not a total-duration timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the notification relay waits for a progress change before
    /// reporting a stalled transfer, in seconds
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,

    /// UI policy for the coordinator
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            platform: default_platform(),
            query_intent: default_query_intent(),
            cache_dir: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            stall_timeout_secs: default_stall_timeout(),
            policy: PolicyConfig::default(),
        }
    }
}

fn default_platform() -> String {
    "android".to_string()
}

fn default_query_intent() -> String {
    "needUpgrade".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_stall_timeout() -> u64 {
    30
}

impl UpdateConfig {
    /// Create a configuration with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the default configuration file path
    ///
    /// Honors the `AIRLIFT_CONFIG_PATH` environment variable, falling back to
    /// `~/.airlift/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("AIRLIFT_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".airlift")
            .join("config.toml"))
    }

    /// Load the configuration from the default location
    ///
    /// Returns defaults if the file does not exist.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path).await
    }

    /// Load the configuration from a specific path
    ///
    /// A missing file yields the default configuration; a malformed file is
    /// an error.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a specific path, creating parent directories
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Resolve the artifact cache directory
    pub fn artifact_dir(&self) -> Result<PathBuf, UpdateError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|d| d.join("airlift"))
            .ok_or_else(|| UpdateError::ConfigError {
                message: "could not determine a cache directory".to_string(),
            })
    }

    /// Validate that the configuration can support a version check
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.endpoint.is_empty() {
            return Err(UpdateError::ConfigError {
                message: "no update endpoint configured".to_string(),
            });
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout as a [`Duration`]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Relay stall timeout as a [`Duration`]
    #[must_use]
    pub const fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}
