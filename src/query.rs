//! Version check client
//!
//! Wraps the remote call that returns version metadata. Pure
//! request/response: one asynchronous HTTP call per invocation, no state, no
//! retry — a failed check is terminal for that check cycle and the caller
//! owns any retry policy (there is none by default).
//!
//! The request shape is
//! `GET {endpoint}?q={query_intent}&build={current_build}&client={platform}`;
//! a 2xx response must decode to a [`VersionDocument`]. A non-success status
//! maps to [`UpdateError::NetworkUnavailable`], a malformed body to
//! [`UpdateError::DecodeFailure`].

use async_trait::async_trait;
use tracing::debug;

use crate::config::UpdateConfig;
use crate::core::UpdateError;
use crate::model::VersionDocument;

/// Seam for the version check call
///
/// The worker depends on this trait rather than a concrete HTTP client so
/// tests can substitute deterministic fakes.
#[async_trait]
pub trait VersionQuery: Send + Sync {
    /// Fetch the latest version document for the given running build
    async fn fetch_version(&self, current_build: u64) -> Result<VersionDocument, UpdateError>;
}

/// HTTP implementation of [`VersionQuery`]
#[derive(Debug, Clone)]
pub struct VersionClient {
    endpoint: String,
    platform: String,
    query_intent: String,
    client: reqwest::Client,
}

impl VersionClient {
    /// Build a client from the coordinator configuration
    ///
    /// Fails if the configuration has no endpoint or the HTTP client cannot
    /// be constructed.
    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| UpdateError::ConfigError {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            platform: config.platform.clone(),
            query_intent: config.query_intent.clone(),
            client,
        })
    }
}

#[async_trait]
impl VersionQuery for VersionClient {
    async fn fetch_version(&self, current_build: u64) -> Result<VersionDocument, UpdateError> {
        debug!(
            endpoint = %self.endpoint,
            current_build,
            "Checking for a newer build"
        );

        let build = current_build.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", self.query_intent.as_str()),
                ("build", build.as_str()),
                ("client", self.platform.as_str()),
            ])
            .send()
            .await
            .map_err(|e| UpdateError::NetworkUnavailable {
                operation: "version check".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::NetworkUnavailable {
                operation: "version check".to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::NetworkUnavailable {
                operation: "version check".to_string(),
                reason: e.to_string(),
            })?;

        let doc: VersionDocument =
            serde_json::from_str(&body).map_err(|e| UpdateError::DecodeFailure {
                reason: e.to_string(),
            })?;

        debug!(
            latest_build = doc.build,
            need_upgrade = doc.need_upgrade,
            must_upgrade = doc.must_upgrade,
            "Version check response decoded"
        );

        Ok(doc)
    }
}
