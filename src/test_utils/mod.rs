//! Test utilities for airlift
//!
//! Deterministic doubles for every host collaborator and boundary seam:
//! scripted version queries and artifact transfers, recording notifiers,
//! installers, frontends, and host handles. Unit tests and the integration
//! suite share these through the `test-utils` feature.
//!
//! The doubles are deliberately simple: scripted ones replay a fixed
//! response (optionally holding at a gate until the test releases it),
//! recording ones append every call to an inspectable log.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::core::UpdateError;
use crate::download::{ArtifactFetcher, DownloadEngine, ProgressFn};
use crate::host::{
    HostHandle, Installer, MeteredChoice, NetworkKind, NetworkMonitor, PromptChoice,
    StatusNotifier, UpdateFrontend,
};
use crate::model::{UpdateModel, VersionDocument};
use crate::query::VersionQuery;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests, once per process
///
/// Respects `RUST_LOG`; silent when the variable is unset.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Build a version document for tests
#[must_use]
pub fn version_doc(build: u64, need_upgrade: bool, must_upgrade: bool) -> VersionDocument {
    VersionDocument {
        build,
        description: "Bug fixes and performance improvements".to_string(),
        upgrade_url: format!("https://updates.example.com/builds/app-{build}.apk"),
        need_upgrade,
        must_upgrade,
    }
}

/// Scripted [`VersionQuery`] replaying queued responses
///
/// Counts invocations and can hold each call at a gate until the test
/// releases a permit, which is how check-in-flight interleavings are
/// exercised deterministically.
pub struct ScriptedQuery {
    responses: Mutex<VecDeque<Result<VersionDocument, UpdateError>>>,
    gate: Option<Arc<Semaphore>>,
    /// Number of times `fetch_version` was invoked
    pub calls: AtomicU32,
}

impl ScriptedQuery {
    /// Always answer with the given document
    #[must_use]
    pub fn ok(doc: VersionDocument) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Ok(doc)])),
            gate: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Always answer with the given error
    #[must_use]
    pub fn err(error: UpdateError) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            gate: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Hold every call until the returned gate receives a permit
    #[must_use]
    pub fn gated(doc: VersionDocument) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let query = Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Ok(doc)])),
            gate: Some(Arc::clone(&gate)),
            calls: AtomicU32::new(0),
        });
        (query, gate)
    }

    /// Number of recorded calls
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionQuery for ScriptedQuery {
    async fn fetch_version(&self, _current_build: u64) -> Result<VersionDocument, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("query gate closed").forget();
        }
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => Err(UpdateError::Other {
                message: "scripted query exhausted".to_string(),
            }),
            1 => responses.front().unwrap().clone(),
            _ => responses.pop_front().unwrap(),
        }
    }
}

/// Scripted [`ArtifactFetcher`] replaying a fixed progress sequence
///
/// Writes the payload under the engine-derived file name on success so the
/// rest of the pipeline sees realistic paths. A gate, when armed, holds the
/// transfer open after the progress sequence until the test releases it —
/// the download is then observably "in flight".
pub struct ScriptedFetcher {
    outcome: Result<Vec<u8>, UpdateError>,
    steps: Vec<(f32, u64)>,
    gate: Option<Arc<Semaphore>>,
    /// Number of times `fetch` was invoked
    pub calls: AtomicU32,
}

impl ScriptedFetcher {
    /// Succeed with `payload` after emitting `steps` progress callbacks
    #[must_use]
    pub fn ok(payload: Vec<u8>, steps: Vec<(f32, u64)>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(payload),
            steps,
            gate: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Fail with `error` after emitting `steps` progress callbacks
    #[must_use]
    pub fn err(error: UpdateError, steps: Vec<(f32, u64)>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            steps,
            gate: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Hold the transfer open after the progress steps until the returned
    /// gate receives a permit
    #[must_use]
    pub fn gated(payload: Vec<u8>, steps: Vec<(f32, u64)>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = Arc::new(Self {
            outcome: Ok(payload),
            steps,
            gate: Some(Arc::clone(&gate)),
            calls: AtomicU32::new(0),
        });
        (fetcher, gate)
    }
}

#[async_trait]
impl ArtifactFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: ProgressFn,
    ) -> Result<PathBuf, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (fraction, total) in &self.steps {
            progress(*fraction, *total);
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("fetcher gate closed").forget();
        }
        match &self.outcome {
            Ok(payload) => {
                tokio::fs::create_dir_all(dest_dir).await?;
                let dest = dest_dir.join(DownloadEngine::artifact_file_name(url));
                tokio::fs::write(&dest, payload).await?;
                Ok(dest)
            }
            Err(e) => Err(e.clone()),
        }
    }
}

/// Recording [`StatusNotifier`]
#[derive(Default)]
pub struct RecordingNotifier {
    /// Every `(title, percent)` published, in order
    pub published: Mutex<Vec<(String, u8)>>,
    /// Number of `clear` calls
    pub cleared: AtomicU32,
}

impl RecordingNotifier {
    /// Fresh recorder
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Published percent values, in order
    #[must_use]
    pub fn percents(&self) -> Vec<u8> {
        self.published.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    /// Whether the entry was cleared at least once
    #[must_use]
    pub fn was_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst) > 0
    }
}

impl StatusNotifier for RecordingNotifier {
    fn publish(&self, title: &str, percent: u8) {
        self.published
            .lock()
            .unwrap()
            .push((title.to_string(), percent));
    }

    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recording [`Installer`]
#[derive(Default)]
pub struct RecordingInstaller {
    /// Every `(artifact path, mime)` handed off
    pub installs: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingInstaller {
    /// Fresh recorder
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(&self, path: &Path, mime: &str) -> Result<(), UpdateError> {
        self.installs
            .lock()
            .unwrap()
            .push((path.to_path_buf(), mime.to_string()));
        Ok(())
    }
}

/// Recording [`HostHandle`]
#[derive(Default)]
pub struct RecordingHost {
    /// Whether the keepalive marker is currently raised
    pub keepalive_active: AtomicBool,
    /// Number of times the keepalive was raised
    pub keepalive_raised: AtomicU32,
    /// Number of `exit_app` calls
    pub exits: AtomicU32,
}

impl RecordingHost {
    /// Fresh recorder
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl HostHandle for RecordingHost {
    fn raise_keepalive(&self) {
        self.keepalive_active.store(true, Ordering::SeqCst);
        self.keepalive_raised.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_keepalive(&self) {
        self.keepalive_active.store(false, Ordering::SeqCst);
    }

    fn exit_app(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed-answer [`NetworkMonitor`]
pub struct StaticNetwork {
    kind: Mutex<NetworkKind>,
}

impl StaticNetwork {
    /// Monitor that always reports `kind`
    #[must_use]
    pub fn new(kind: NetworkKind) -> Arc<Self> {
        Arc::new(Self {
            kind: Mutex::new(kind),
        })
    }

    /// Change the reported kind mid-test
    pub fn set(&self, kind: NetworkKind) {
        *self.kind.lock().unwrap() = kind;
    }
}

impl NetworkMonitor for StaticNetwork {
    fn network_kind(&self) -> NetworkKind {
        *self.kind.lock().unwrap()
    }
}

/// Scripted, recording [`UpdateFrontend`]
///
/// Answers prompts with preconfigured choices and records every surface
/// interaction for assertions.
pub struct ScriptedFrontend {
    /// Answer returned from the decision prompt
    pub prompt_choice: Mutex<PromptChoice>,
    /// Answer returned from the metered confirmation
    pub metered_choice: Mutex<MeteredChoice>,
    /// `cancelable` flag of every decision prompt shown
    pub prompts: Mutex<Vec<bool>>,
    /// Number of metered confirmations shown
    pub metered_confirms: AtomicU32,
    /// Every toast message
    pub toasts: Mutex<Vec<String>>,
    /// `blocking` flag of every download start
    pub download_starts: Mutex<Vec<bool>>,
    /// Every progress update forwarded to the indicator
    pub progress: Mutex<Vec<(f32, u64)>>,
    /// Number of times the indicator was dismissed
    pub download_finishes: AtomicU32,
}

impl ScriptedFrontend {
    /// Frontend that accepts every prompt (and proceeds on metered)
    #[must_use]
    pub fn accepting() -> Arc<Self> {
        Self::with_choices(PromptChoice::UpdateNow, MeteredChoice::Proceed)
    }

    /// Frontend that declines the decision prompt
    #[must_use]
    pub fn declining() -> Arc<Self> {
        Self::with_choices(PromptChoice::Later, MeteredChoice::Defer)
    }

    /// Frontend with explicit answers for both dialogs
    #[must_use]
    pub fn with_choices(prompt: PromptChoice, metered: MeteredChoice) -> Arc<Self> {
        Arc::new(Self {
            prompt_choice: Mutex::new(prompt),
            metered_choice: Mutex::new(metered),
            prompts: Mutex::new(Vec::new()),
            metered_confirms: AtomicU32::new(0),
            toasts: Mutex::new(Vec::new()),
            download_starts: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            download_finishes: AtomicU32::new(0),
        })
    }

    /// Number of decision prompts shown
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl UpdateFrontend for ScriptedFrontend {
    async fn prompt_update(&self, _model: &UpdateModel, cancelable: bool) -> PromptChoice {
        self.prompts.lock().unwrap().push(cancelable);
        let choice = *self.prompt_choice.lock().unwrap();
        if !cancelable {
            // A mandatory prompt offers no decline action
            return PromptChoice::UpdateNow;
        }
        choice
    }

    async fn confirm_metered(&self) -> MeteredChoice {
        self.metered_confirms.fetch_add(1, Ordering::SeqCst);
        *self.metered_choice.lock().unwrap()
    }

    fn toast(&self, message: &str) {
        self.toasts.lock().unwrap().push(message.to_string());
    }

    fn download_started(&self, blocking: bool) {
        self.download_starts.lock().unwrap().push(blocking);
    }

    fn download_progress(&self, fraction: f32, total_bytes: u64) {
        self.progress.lock().unwrap().push((fraction, total_bytes));
    }

    fn download_finished(&self) {
        self.download_finishes.fetch_add(1, Ordering::SeqCst);
    }
}
