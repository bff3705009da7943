//! Worker connection management
//!
//! Abstracts the host-controlled service lifecycle as an explicit connection
//! object. [`WorkerService`] owns the single worker task per process,
//! spawning it lazily on first use and keeping it alive across connections;
//! [`WorkerConnection`] is the handle a coordinator holds while connected.
//!
//! Releasing a connection is a negotiation, not a drop: the worker refuses
//! the release while a download is in flight, so the handle's
//! [`release`](WorkerConnection::release) answers whether the detach actually
//! happened. Coordinators keep the handle and try again after the transfer
//! reaches a terminal state.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::config::UpdateConfig;
use crate::core::UpdateError;
use crate::download::{ArtifactFetcher, DownloadEngine};
use crate::host::{HostHandle, Installer, StatusNotifier};
use crate::model::UpdateModel;
use crate::query::{VersionClient, VersionQuery};
use crate::worker::{self, WorkerCommand, WorkerEvent};

/// Connection lifecycle between a coordinator and the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the worker may not even be spawned yet
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Attached; worker events flow to this coordinator
    Connected,
}

/// Factory and owner of the per-process update worker
///
/// Construct one per process and share it (via `Arc`) with every
/// coordinator. The worker task is spawned on the first
/// [`connect`](Self::connect) and survives disconnections; later connections
/// reuse it.
pub struct WorkerService {
    config: Arc<UpdateConfig>,
    query: Arc<dyn VersionQuery>,
    fetcher: Arc<dyn ArtifactFetcher>,
    notifier: Arc<dyn StatusNotifier>,
    installer: Arc<dyn Installer>,
    host: Arc<dyn HostHandle>,
    commands: Mutex<Option<mpsc::UnboundedSender<WorkerCommand>>>,
}

impl WorkerService {
    /// Create a service with explicit boundary implementations
    ///
    /// Intended for tests and hosts that substitute their own transports;
    /// production hosts normally use [`with_http`](Self::with_http).
    #[must_use]
    pub fn new(
        config: Arc<UpdateConfig>,
        query: Arc<dyn VersionQuery>,
        fetcher: Arc<dyn ArtifactFetcher>,
        notifier: Arc<dyn StatusNotifier>,
        installer: Arc<dyn Installer>,
        host: Arc<dyn HostHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            query,
            fetcher,
            notifier,
            installer,
            host,
            commands: Mutex::new(None),
        })
    }

    /// Create a service backed by the HTTP version client and download engine
    pub fn with_http(
        config: Arc<UpdateConfig>,
        notifier: Arc<dyn StatusNotifier>,
        installer: Arc<dyn Installer>,
        host: Arc<dyn HostHandle>,
    ) -> Result<Arc<Self>, UpdateError> {
        let query = Arc::new(VersionClient::from_config(&config)?);
        let fetcher = Arc::new(DownloadEngine::from_config(&config)?);
        Ok(Self::new(config, query, fetcher, notifier, installer, host))
    }

    /// The coordinator configuration this service was built with
    #[must_use]
    pub fn config(&self) -> &Arc<UpdateConfig> {
        &self.config
    }

    fn commands(&self) -> mpsc::UnboundedSender<WorkerCommand> {
        let mut guard = self.commands.lock().unwrap();
        if let Some(commands) = guard.as_ref() {
            if !commands.is_closed() {
                return commands.clone();
            }
        }
        let commands = worker::spawn(
            Arc::clone(&self.config),
            Arc::clone(&self.query),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.notifier),
            Arc::clone(&self.installer),
            Arc::clone(&self.host),
        );
        *guard = Some(commands.clone());
        commands
    }

    /// Attach to the worker, spawning it if needed
    ///
    /// Returns the connection handle and the event stream for this
    /// connection. Attaching replaces any previously registered event sink;
    /// hosts are expected to hold at most one live connection at a time.
    pub async fn connect(
        &self,
    ) -> Result<(WorkerConnection, mpsc::UnboundedReceiver<WorkerEvent>), UpdateError> {
        let commands = self.commands();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();

        commands
            .send(WorkerCommand::Attach {
                events: events_tx,
                ack: ack_tx,
            })
            .map_err(|_| UpdateError::WorkerDisconnected)?;
        ack_rx.await.map_err(|_| UpdateError::WorkerDisconnected)?;

        Ok((WorkerConnection { commands }, events_rx))
    }
}

/// Handle to an attached worker
///
/// Cheap to clone; all methods are fire-or-roundtrip messages to the worker
/// actor. Every method can fail with [`UpdateError::WorkerDisconnected`] if
/// the worker task is gone.
#[derive(Clone)]
pub struct WorkerConnection {
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerConnection {
    /// Request a version check for the given running build
    ///
    /// No-op in the worker if a check is already in flight.
    pub fn check(&self, current_build: u64) -> Result<(), UpdateError> {
        self.commands
            .send(WorkerCommand::Check { current_build })
            .map_err(|_| UpdateError::WorkerDisconnected)
    }

    /// Request the download of the checked update
    pub fn download(&self) -> Result<(), UpdateError> {
        self.commands
            .send(WorkerCommand::Download)
            .map_err(|_| UpdateError::WorkerDisconnected)
    }

    /// Ask the worker whether a download is in flight
    pub async fn is_downloading(&self) -> Result<bool, UpdateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(WorkerCommand::IsDownloading { reply })
            .map_err(|_| UpdateError::WorkerDisconnected)?;
        rx.await.map_err(|_| UpdateError::WorkerDisconnected)
    }

    /// Fetch the worker's current model snapshot
    pub async fn model(&self) -> Result<Option<UpdateModel>, UpdateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(WorkerCommand::Model { reply })
            .map_err(|_| UpdateError::WorkerDisconnected)?;
        rx.await.map_err(|_| UpdateError::WorkerDisconnected)
    }

    /// Try to release the connection
    ///
    /// Returns `Ok(false)` when the worker refused because a download is in
    /// flight; the connection remains attached in that case.
    pub async fn release(&self) -> Result<bool, UpdateError> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(WorkerCommand::Detach { ack })
            .map_err(|_| UpdateError::WorkerDisconnected)?;
        rx.await.map_err(|_| UpdateError::WorkerDisconnected)
    }
}
