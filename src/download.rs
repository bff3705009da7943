//! Artifact download engine
//!
//! Streams the update artifact to the cache directory, reporting progress as
//! `(fraction, total_bytes)` after every chunk. Transfers are one-shot: there
//! is no resume support, and a failed transfer discards the partial file.
//!
//! The destination file name is derived deterministically from the URL — the
//! SHA-256 of the trailing path segment plus a fixed extension — so repeated
//! downloads of the same artifact land on the same path without trusting the
//! server's file name.

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::UpdateConfig;
use crate::core::UpdateError;

/// Extension appended to every cached artifact
pub const ARTIFACT_EXTENSION: &str = "apk";

/// Progress observer invoked after every received chunk
///
/// Arguments are the completed fraction in `0.0..=1.0` and the total transfer
/// size in bytes (0 when the server did not announce a length).
pub type ProgressFn = Arc<dyn Fn(f32, u64) + Send + Sync>;

/// Seam for the artifact transfer
///
/// The worker depends on this trait so tests can substitute scripted
/// transfers with deterministic progress sequences.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Transfer the artifact at `url` into `dest_dir`
    ///
    /// Resolves to the path of the completed file; the partial file is
    /// removed on failure.
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressFn,
    ) -> Result<PathBuf, UpdateError>;
}

/// HTTP implementation of [`ArtifactFetcher`]
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: reqwest::Client,
}

impl DownloadEngine {
    /// Build an engine from the coordinator configuration
    ///
    /// Only the connect timeout applies to downloads; total duration is
    /// bounded by the stall detector on the notification relay, not here.
    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| UpdateError::ConfigError {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Derive the cache file name for an artifact URL
    ///
    /// The trailing path segment is hashed so the name is stable for a given
    /// URL and safe for any file system.
    #[must_use]
    pub fn artifact_file_name(url: &str) -> String {
        let segment = url.rsplit('/').next().unwrap_or(url);
        let digest = Sha256::digest(segment.as_bytes());
        format!("{}.{ARTIFACT_EXTENSION}", hex::encode(digest))
    }
}

#[async_trait]
impl ArtifactFetcher for DownloadEngine {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressFn,
    ) -> Result<PathBuf, UpdateError> {
        fs::create_dir_all(dest_dir)
            .await
            .map_err(|_| UpdateError::FileSystemError {
                operation: "create artifact cache directory".to_string(),
                path: dest_dir.display().to_string(),
            })?;

        let dest = dest_dir.join(Self::artifact_file_name(url));
        debug!(url, dest = %dest.display(), "Starting artifact download");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::NetworkUnavailable {
                operation: "artifact download".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::NetworkUnavailable {
                operation: "artifact download".to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(&dest)
            .await
            .map_err(|_| UpdateError::FileSystemError {
                operation: "create artifact file".to_string(),
                path: dest.display().to_string(),
            })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    discard_partial(&dest).await;
                    return Err(UpdateError::DownloadFailure {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            if let Err(e) = file.write_all(&bytes).await {
                discard_partial(&dest).await;
                return Err(UpdateError::DownloadFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }

            downloaded += bytes.len() as u64;
            let fraction = if total > 0 {
                (downloaded as f32 / total as f32).min(1.0)
            } else {
                0.0
            };
            progress(fraction, total);
        }

        if let Err(e) = file.flush().await {
            discard_partial(&dest).await;
            return Err(UpdateError::DownloadFailure {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }

        // Servers without a content length never reach 1.0 in the loop
        progress(1.0, total);

        debug!(
            bytes = downloaded,
            dest = %dest.display(),
            "Artifact download complete"
        );
        Ok(dest)
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<(f32, u64)>>>) {
        let seen: Arc<Mutex<Vec<(f32, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |fraction, total| {
            sink.lock().unwrap().push((fraction, total));
        });
        (progress, seen)
    }

    #[test]
    fn test_artifact_file_name_is_hash_of_trailing_segment() {
        let name = DownloadEngine::artifact_file_name("https://u.example.com/builds/app-12.apk");
        // SHA-256 of "app-12.apk", hex-encoded, plus the fixed extension
        assert_eq!(name.len(), 64 + 1 + ARTIFACT_EXTENSION.len());
        assert!(name.ends_with(".apk"));

        // Stable for the same URL, different for a different artifact
        let again = DownloadEngine::artifact_file_name("https://mirror.example.org/app-12.apk");
        assert_eq!(name, again);
        let other = DownloadEngine::artifact_file_name("https://u.example.com/builds/app-13.apk");
        assert_ne!(name, other);
    }

    #[tokio::test]
    async fn test_fetch_writes_file_and_reports_monotonic_progress() {
        let payload: Vec<u8> = (0..16384u32).flat_map(|n| n.to_le_bytes()).collect();
        let body = payload.clone();
        let app = Router::new().route("/app.apk", get(move || async move { body }));
        let base = serve(app).await;

        let temp = TempDir::new().unwrap();
        let engine = DownloadEngine::from_config(&UpdateConfig::default()).unwrap();
        let (progress, seen) = recording_progress();

        let url = format!("{base}/app.apk");
        let path = engine.fetch(&url, temp.path(), progress).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), payload);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            DownloadEngine::artifact_file_name(&url)
        );

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.last().unwrap().0, 1.0);
        assert_eq!(seen.last().unwrap().1, payload.len() as u64);
    }

    #[tokio::test]
    async fn test_fetch_maps_http_error_status() {
        let app = Router::new().route(
            "/app.apk",
            get(|| async { axum::http::StatusCode::NOT_FOUND }),
        );
        let base = serve(app).await;

        let temp = TempDir::new().unwrap();
        let engine = DownloadEngine::from_config(&UpdateConfig::default()).unwrap();
        let (progress, _) = recording_progress();

        let err = engine
            .fetch(&format!("{base}/app.apk"), temp.path(), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NetworkUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let temp = TempDir::new().unwrap();
        let engine = DownloadEngine::from_config(&UpdateConfig::default()).unwrap();
        let (progress, _) = recording_progress();

        let err = engine
            .fetch(&format!("http://{addr}/app.apk"), temp.path(), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NetworkUnavailable { .. }));
    }
}
