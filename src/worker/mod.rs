//! Background update worker
//!
//! The worker is the long-lived half of the update system: a single actor
//! task per process that owns the check/download lifecycle, the current
//! [`UpdateModel`], the downloading flag, and the foreground-keepalive
//! marker. Foreground coordinators come and go — screens open and close,
//! connections attach and detach — while the worker task keeps running, and
//! a download that is in flight keeps going even if nobody is listening.
//!
//! # State machine
//!
//! ```text
//! Idle → Checking → Idle        (check failed)
//!                 → Checked     (model stored, clamped)
//! Checked → Downloading → Checked   (success or failure)
//! ```
//!
//! Invariants the actor enforces by construction:
//! - Only one check is ever in flight; a `check` command while `Checking`
//!   is dropped (idempotent).
//! - A download only starts from `Checked` with a model present, and check
//!   and download are mutually exclusive.
//! - A detach request while `downloading` is refused. Because refusal and
//!   download completion are both decided on the actor's single command
//!   loop, no interleaving of release attempts and transfer completion can
//!   tear the worker down mid-download.
//! - On accepted detach the worker clears its event sink and drops the
//!   model, so nothing dangles into the next connection.
//!
//! All network I/O runs on spawned subtasks; the actor itself never blocks,
//! so state queries stay responsive during a transfer.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::UpdateConfig;
use crate::core::{TransferPhase, UpdateError};
use crate::download::{ArtifactFetcher, ProgressFn};
use crate::host::{HostHandle, Installer, StatusNotifier, PACKAGE_MIME};
use crate::model::{UpdateModel, VersionDocument};
use crate::query::VersionQuery;
use crate::relay::{ProgressRelay, RelayExit};

#[cfg(test)]
mod tests;

/// Events delivered to the attached coordinator
///
/// Sent over the connection's event channel in the order they occur; the
/// coordinator consumes them on the UI-owning task.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A check completed; carries the clamped model snapshot
    CheckSucceeded(UpdateModel),
    /// A check failed; the cycle is over
    CheckFailed(UpdateError),
    /// A download started
    DownloadBegan,
    /// Transfer progress
    DownloadProgress {
        /// Completed fraction in `0.0..=1.0`
        fraction: f32,
        /// Total transfer size in bytes (0 when unknown)
        total_bytes: u64,
    },
    /// The artifact is fully downloaded and handed to the installer
    DownloadSucceeded(PathBuf),
    /// The transfer failed
    DownloadFailed(UpdateError),
}

/// Commands accepted by the worker actor
pub(crate) enum WorkerCommand {
    /// Register the event sink for the new connection
    Attach {
        events: mpsc::UnboundedSender<WorkerEvent>,
        ack: oneshot::Sender<()>,
    },
    /// Release the connection; answered with `false` while downloading
    Detach { ack: oneshot::Sender<bool> },
    /// Run a version check for the given running build
    Check { current_build: u64 },
    /// Start downloading the previously checked update
    Download,
    /// Query the downloading flag
    IsDownloading { reply: oneshot::Sender<bool> },
    /// Query the current model snapshot
    Model {
        reply: oneshot::Sender<Option<UpdateModel>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Checking,
    Checked,
    Downloading,
}

/// Results flowing back from spawned subtasks onto the actor loop
enum TaskOutcome {
    CheckDone {
        seq: u64,
        current_build: u64,
        result: Result<VersionDocument, UpdateError>,
    },
    Progress {
        fraction: f32,
        total_bytes: u64,
    },
    DownloadDone(Result<PathBuf, UpdateError>),
}

struct UpdateWorker {
    config: Arc<UpdateConfig>,
    query: Arc<dyn VersionQuery>,
    fetcher: Arc<dyn ArtifactFetcher>,
    notifier: Arc<dyn StatusNotifier>,
    installer: Arc<dyn Installer>,
    host: Arc<dyn HostHandle>,

    state: WorkerState,
    model: Option<UpdateModel>,
    downloading: bool,
    events: Option<mpsc::UnboundedSender<WorkerEvent>>,
    phase_tx: Option<watch::Sender<TransferPhase>>,
    /// Generation counter so a check result from before a detach cannot be
    /// mistaken for the current connection's check
    check_seq: u64,
}

/// Spawn the worker actor and return its command channel
pub(crate) fn spawn(
    config: Arc<UpdateConfig>,
    query: Arc<dyn VersionQuery>,
    fetcher: Arc<dyn ArtifactFetcher>,
    notifier: Arc<dyn StatusNotifier>,
    installer: Arc<dyn Installer>,
    host: Arc<dyn HostHandle>,
) -> mpsc::UnboundedSender<WorkerCommand> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let worker = UpdateWorker {
        config,
        query,
        fetcher,
        notifier,
        installer,
        host,
        state: WorkerState::Idle,
        model: None,
        downloading: false,
        events: None,
        phase_tx: None,
        check_seq: 0,
    };
    tokio::spawn(worker.run(cmd_rx));
    cmd_tx
}

impl UpdateWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WorkerCommand>) {
        debug!("Update worker started");
        let (task_tx, mut task_rx) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &task_tx),
                    None => break,
                },
                Some(outcome) = task_rx.recv() => self.handle_task(outcome),
            }
        }

        // The command channel is gone: the host dropped the worker service.
        // Mirror a destroyed service: no listener, no lingering notification
        // or keepalive.
        debug!("Update worker shutting down");
        self.events = None;
        self.notifier.clear();
        if self.downloading {
            self.host.clear_keepalive();
            self.downloading = false;
        }
    }

    fn handle_command(
        &mut self,
        cmd: WorkerCommand,
        task_tx: &mpsc::UnboundedSender<TaskOutcome>,
    ) {
        match cmd {
            WorkerCommand::Attach { events, ack } => {
                debug!("Coordinator attached");
                self.events = Some(events);
                let _ = ack.send(());
            }
            WorkerCommand::Detach { ack } => {
                if self.downloading {
                    debug!("Detach refused: download in flight");
                    let _ = ack.send(false);
                    return;
                }
                debug!("Coordinator detached");
                self.events = None;
                self.model = None;
                self.state = WorkerState::Idle;
                let _ = ack.send(true);
            }
            WorkerCommand::Check { current_build } => self.start_check(current_build, task_tx),
            WorkerCommand::Download => self.start_download(task_tx),
            WorkerCommand::IsDownloading { reply } => {
                let _ = reply.send(self.downloading);
            }
            WorkerCommand::Model { reply } => {
                let _ = reply.send(self.model.clone());
            }
        }
    }

    fn start_check(&mut self, current_build: u64, task_tx: &mpsc::UnboundedSender<TaskOutcome>) {
        match self.state {
            WorkerState::Checking => {
                debug!("Check already in flight; ignoring");
                return;
            }
            WorkerState::Downloading => {
                debug!("Download in flight; check ignored");
                return;
            }
            WorkerState::Idle | WorkerState::Checked => {}
        }

        self.state = WorkerState::Checking;
        self.check_seq += 1;
        let seq = self.check_seq;

        let query = Arc::clone(&self.query);
        let task_tx = task_tx.clone();
        tokio::spawn(async move {
            let result = query.fetch_version(current_build).await;
            let _ = task_tx.send(TaskOutcome::CheckDone {
                seq,
                current_build,
                result,
            });
        });
    }

    fn start_download(&mut self, task_tx: &mpsc::UnboundedSender<TaskOutcome>) {
        if self.downloading {
            debug!("Download already in flight; ignoring");
            return;
        }
        let Some(model) = self.model.clone() else {
            warn!("Download requested without a completed check");
            self.emit(WorkerEvent::DownloadFailed(UpdateError::NoPendingUpdate));
            return;
        };
        if self.state != WorkerState::Checked {
            warn!(state = ?self.state, "Download requested in invalid state");
            self.emit(WorkerEvent::DownloadFailed(UpdateError::NoPendingUpdate));
            return;
        }

        let dest_dir = match self.config.artifact_dir() {
            Ok(dir) => dir,
            Err(e) => {
                self.emit(WorkerEvent::DownloadFailed(e));
                return;
            }
        };

        info!(url = %model.download_url, "Starting update download");
        self.state = WorkerState::Downloading;
        self.downloading = true;
        self.host.raise_keepalive();

        // Progress fan-out: the transfer publishes through the actor, the
        // actor mirrors onto the watch channel the notification relay sleeps
        // on.
        let (phase_tx, phase_rx) = watch::channel(TransferPhase::Running(0));
        self.phase_tx = Some(phase_tx);

        let relay = ProgressRelay::new(Arc::clone(&self.notifier), self.config.stall_timeout());
        tokio::spawn(async move {
            match relay.run(phase_rx).await {
                RelayExit::Stalled => warn!("Download progress stalled"),
                exit => debug!(?exit, "Notification relay finished"),
            }
        });

        self.emit(WorkerEvent::DownloadBegan);

        let progress_tx = task_tx.clone();
        let progress: ProgressFn = Arc::new(move |fraction, total_bytes| {
            let _ = progress_tx.send(TaskOutcome::Progress {
                fraction,
                total_bytes,
            });
        });

        let fetcher = Arc::clone(&self.fetcher);
        let url = model.download_url;
        let task_tx = task_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch(&url, &dest_dir, progress).await;
            let _ = task_tx.send(TaskOutcome::DownloadDone(result));
        });
    }

    fn handle_task(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::CheckDone {
                seq,
                current_build,
                result,
            } => {
                if seq != self.check_seq || self.state != WorkerState::Checking {
                    debug!("Discarding stale check result");
                    return;
                }
                match result {
                    Ok(doc) => {
                        let model = UpdateModel::from_wire(doc, current_build);
                        info!(
                            latest_build = model.latest_build,
                            current_build,
                            needs_upgrade = model.needs_upgrade,
                            must_upgrade = model.must_upgrade,
                            "Version check complete"
                        );
                        self.state = WorkerState::Checked;
                        self.model = Some(model.clone());
                        self.emit(WorkerEvent::CheckSucceeded(model));
                    }
                    Err(e) => {
                        warn!(error = %e, "Version check failed");
                        self.state = WorkerState::Idle;
                        self.emit(WorkerEvent::CheckFailed(e));
                    }
                }
            }
            TaskOutcome::Progress {
                fraction,
                total_bytes,
            } => {
                if !self.downloading {
                    return;
                }
                let pct = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
                if let Some(phase_tx) = &self.phase_tx {
                    phase_tx.send_replace(TransferPhase::Running(pct));
                }
                self.emit(WorkerEvent::DownloadProgress {
                    fraction,
                    total_bytes,
                });
            }
            TaskOutcome::DownloadDone(result) => {
                if !self.downloading {
                    return;
                }
                self.downloading = false;
                self.state = WorkerState::Checked;
                self.host.clear_keepalive();

                match result {
                    Ok(path) => {
                        info!(artifact = %path.display(), "Update downloaded");
                        if let Some(phase_tx) = self.phase_tx.take() {
                            phase_tx.send_replace(TransferPhase::Complete);
                        }
                        self.notifier.clear();
                        self.emit(WorkerEvent::DownloadSucceeded(path.clone()));
                        self.hand_off_to_installer(path);
                    }
                    Err(e) => {
                        warn!(error = %e, "Update download failed");
                        if let Some(phase_tx) = self.phase_tx.take() {
                            phase_tx.send_replace(TransferPhase::Failed);
                        }
                        self.notifier.clear();
                        self.emit(WorkerEvent::DownloadFailed(e));
                    }
                }
            }
        }
    }

    /// Dispatch the artifact to the installer without awaiting the result
    fn hand_off_to_installer(&self, artifact: PathBuf) {
        let installer = Arc::clone(&self.installer);
        tokio::spawn(async move {
            if let Err(e) = installer.install(&artifact, PACKAGE_MIME).await {
                warn!(error = %e, artifact = %artifact.display(), "Installer handoff failed");
            }
        });
    }

    fn emit(&self, event: WorkerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
