//! Foreground update coordinator
//!
//! The coordinator is the policy half of the update system: it owns the
//! connection to the background worker, decides when the user is prompted,
//! when a check runs silently, and when the host process must exit, and it
//! reports exactly one terminal [`CheckOutcome`] per check cycle to the
//! registered handler.
//!
//! Coordinators are cheap, screen-scoped objects; the durable state — the
//! cancellation flag, the dialog gates, the worker itself — lives in
//! [`UpdateRuntime`] and [`WorkerService`], both shared across instances.
//!
//! # A check cycle
//!
//! [`start`](UpdateCoordinator::start) runs one whole cycle on the calling
//! (UI-owning) task: connect → check → apply the policy table → optionally
//! prompt → optionally download → release → deliver the outcome. The policy
//! table on a successful check:
//!
//! | needs upgrade | mandatory | prompt policy | action |
//! |---|---|---|---|
//! | no  | —   | —     | optional toast, release, `NoUpdate` |
//! | yes | no  | off   | silent release, `NeedUpdate` |
//! | yes | no  | on    | decision dialog with decline |
//! | yes | yes | —     | decision dialog without decline |
//!
//! Accepting the prompt on Wi-Fi downloads immediately; on any other network
//! a metered-data confirmation interposes. Declining a mandatory update is
//! impossible by construction; deferring its metered confirmation terminates
//! the host process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PolicyConfig;
use crate::connection::{ConnectionState, WorkerConnection, WorkerService};
use crate::core::CheckOutcome;
use crate::host::{
    HostHandle, MeteredChoice, NetworkKind, NetworkMonitor, PromptChoice, UpdateFrontend,
    UpdateRuntime,
};
use crate::worker::WorkerEvent;


/// Host callback receiving the terminal outcome of a check cycle
pub type OutcomeHandler = Arc<dyn Fn(CheckOutcome) + Send + Sync>;

enum Session {
    Disconnected,
    Connecting,
    Connected(WorkerConnection),
}

/// Foreground-facing orchestrator for the update workflow
pub struct UpdateCoordinator {
    service: Arc<WorkerService>,
    runtime: Arc<UpdateRuntime>,
    frontend: Arc<dyn UpdateFrontend>,
    network: Arc<dyn NetworkMonitor>,
    host: Arc<dyn HostHandle>,
    current_build: u64,
    policy: Mutex<PolicyConfig>,
    handler: Mutex<Option<OutcomeHandler>>,
    session: Mutex<Session>,
    delivered: AtomicBool,
}

impl UpdateCoordinator {
    /// Create a coordinator bound to the shared worker service and runtime
    ///
    /// `current_build` is the build number of the running application. The
    /// initial UI policy comes from the service configuration; override it
    /// with [`set_policy`](Self::set_policy).
    #[must_use]
    pub fn new(
        service: Arc<WorkerService>,
        runtime: Arc<UpdateRuntime>,
        frontend: Arc<dyn UpdateFrontend>,
        network: Arc<dyn NetworkMonitor>,
        host: Arc<dyn HostHandle>,
        current_build: u64,
    ) -> Arc<Self> {
        let policy = service.config().policy;
        Arc::new(Self {
            service,
            runtime,
            frontend,
            network,
            host,
            current_build,
            policy: Mutex::new(policy),
            handler: Mutex::new(None),
            session: Mutex::new(Session::Disconnected),
            delivered: AtomicBool::new(false),
        })
    }

    /// Replace the UI policy
    ///
    /// Read at the moment a check result arrives, so changes made before the
    /// callback take effect for the current cycle.
    pub fn set_policy(&self, policy: PolicyConfig) {
        *self.policy.lock().unwrap() = policy;
    }

    /// Register the host callback for terminal outcomes
    pub fn set_outcome_handler(&self, handler: OutcomeHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match &*self.session.lock().unwrap() {
            Session::Disconnected => ConnectionState::Disconnected,
            Session::Connecting => ConnectionState::Connecting,
            Session::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Run one update check cycle
    ///
    /// No-op (`None`) when the cancellation flag is set, a blocking dialog
    /// is visible, or a cycle is already running on this coordinator —
    /// calling `start` twice while the first check is pending never issues a
    /// second network call. Otherwise drives the cycle to its terminal
    /// outcome, delivers it to the registered handler exactly once, and
    /// returns it.
    pub async fn start(&self) -> Option<CheckOutcome> {
        if self.runtime.is_canceled() {
            debug!("Update checking canceled for this cycle; start ignored");
            return None;
        }
        if self.runtime.dialog_visible() {
            debug!("A blocking dialog is visible; start ignored");
            return None;
        }
        {
            let mut session = self.session.lock().unwrap();
            if !matches!(*session, Session::Disconnected) {
                debug!("Already connected or connecting; start ignored");
                return None;
            }
            *session = Session::Connecting;
        }
        self.delivered.store(false, Ordering::SeqCst);

        let (conn, events) = match self.service.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to connect to the update worker");
                *self.session.lock().unwrap() = Session::Disconnected;
                return Some(self.fail_cycle());
            }
        };
        *self.session.lock().unwrap() = Session::Connected(conn.clone());

        if conn.check(self.current_build).is_err() {
            *self.session.lock().unwrap() = Session::Disconnected;
            return Some(self.fail_cycle());
        }

        self.drive(conn, events).await
    }

    /// Release the worker connection if it is safe to do so
    ///
    /// Refuses (returns `false`) while a blocking dialog is visible or the
    /// worker reports a download in flight; the worker independently refuses
    /// a release that races with a starting download, so the connection can
    /// never be torn down mid-transfer.
    pub async fn stop(&self) -> bool {
        if self.runtime.dialog_visible() {
            debug!("A blocking dialog is visible; stop ignored");
            return false;
        }

        let conn = match &*self.session.lock().unwrap() {
            Session::Disconnected => return true,
            Session::Connecting => return false,
            Session::Connected(conn) => conn.clone(),
        };

        match conn.is_downloading().await {
            Ok(true) => {
                debug!("Download in flight; stop ignored");
                return false;
            }
            Ok(false) => {}
            Err(_) => {
                *self.session.lock().unwrap() = Session::Disconnected;
                return true;
            }
        }

        // Mark disconnected before the release so an in-flight drive loop
        // classifies the ending event stream as a voluntary teardown
        *self.session.lock().unwrap() = Session::Disconnected;
        match conn.release().await {
            Ok(true) => {
                debug!("Worker connection released");
                true
            }
            // The worker began downloading between the poll and the release
            Ok(false) => {
                *self.session.lock().unwrap() = Session::Connected(conn);
                false
            }
            Err(_) => true,
        }
    }

    /// Drive worker events for the current cycle to a terminal outcome
    async fn drive(
        &self,
        conn: WorkerConnection,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) -> Option<CheckOutcome> {
        let mut pending_mandatory = false;

        loop {
            let Some(event) = events.recv().await else {
                // The worker dropped our event sink. If stop() already moved
                // us to Disconnected this is a voluntary teardown and the
                // cycle simply ends; otherwise the worker is gone and the
                // cycle failed.
                let voluntary = matches!(*self.session.lock().unwrap(), Session::Disconnected);
                if voluntary {
                    debug!("Cycle ended by voluntary disconnection");
                    return None;
                }
                warn!("Worker event stream ended unexpectedly");
                *self.session.lock().unwrap() = Session::Disconnected;
                return Some(self.fail_cycle());
            };

            match event {
                WorkerEvent::CheckSucceeded(model) => {
                    self.runtime.publish_availability(model.needs_upgrade);
                    let policy = *self.policy.lock().unwrap();

                    if !model.needs_upgrade {
                        if policy.toast_on_no_update {
                            self.frontend.toast("No update available");
                        }
                        return Some(self.finish(CheckOutcome::NoUpdate).await);
                    }

                    if !model.must_upgrade && !policy.show_prompt_on_non_mandatory {
                        debug!("Update available but prompting is disabled; releasing silently");
                        return Some(self.finish(CheckOutcome::NeedUpdate).await);
                    }

                    let cancelable = !model.must_upgrade;
                    self.runtime.set_prompt_visible(true);
                    let choice = self.frontend.prompt_update(&model, cancelable).await;
                    self.runtime.set_prompt_visible(false);

                    match choice {
                        PromptChoice::Later => {
                            info!("User declined the update");
                            self.runtime.set_canceled();
                            return Some(self.finish(CheckOutcome::UserCanceled).await);
                        }
                        PromptChoice::UpdateNow => {
                            if self.network.network_kind() != NetworkKind::Wifi {
                                self.runtime.set_prompt_visible(true);
                                let metered = self.frontend.confirm_metered().await;
                                self.runtime.set_prompt_visible(false);

                                if metered == MeteredChoice::Defer {
                                    info!("User deferred the download on a metered network");
                                    let mandatory = model.must_upgrade;
                                    let outcome = self.finish(CheckOutcome::UserCanceled).await;
                                    if mandatory {
                                        // A mandatory update may not be
                                        // silently skipped
                                        self.host.exit_app();
                                    }
                                    return Some(outcome);
                                }
                            }

                            pending_mandatory = model.must_upgrade;
                            if conn.download().is_err() {
                                *self.session.lock().unwrap() = Session::Disconnected;
                                return Some(self.fail_cycle());
                            }
                        }
                    }
                }

                WorkerEvent::CheckFailed(e) => {
                    warn!(error = %e, "Version check failed");
                    let policy = *self.policy.lock().unwrap();
                    if policy.toast_on_no_update {
                        self.frontend
                            .toast("Update check failed; check your network settings");
                    }
                    self.runtime.set_canceled();
                    return Some(self.finish(CheckOutcome::CheckFailed).await);
                }

                WorkerEvent::DownloadBegan => {
                    if pending_mandatory {
                        self.runtime.set_progress_visible(true);
                    }
                    self.frontend.download_started(pending_mandatory);
                }

                WorkerEvent::DownloadProgress {
                    fraction,
                    total_bytes,
                } => {
                    self.frontend.download_progress(fraction, total_bytes);
                }

                WorkerEvent::DownloadSucceeded(path) => {
                    info!(artifact = %path.display(), "Update ready to install");
                    self.frontend.download_finished();
                    self.runtime.set_progress_visible(false);
                    return Some(self.finish(CheckOutcome::NeedUpdate).await);
                }

                WorkerEvent::DownloadFailed(e) => {
                    warn!(error = %e, "Update download failed");
                    self.frontend.download_finished();
                    self.runtime.set_progress_visible(false);
                    return Some(self.finish(CheckOutcome::NeedUpdate).await);
                }
            }
        }
    }

    /// Release the connection and deliver the outcome
    async fn finish(&self, outcome: CheckOutcome) -> CheckOutcome {
        self.release_connection().await;
        self.deliver(outcome);
        outcome
    }

    /// Terminal path for cycles that failed before or outside the event loop
    fn fail_cycle(&self) -> CheckOutcome {
        self.runtime.set_canceled();
        self.deliver(CheckOutcome::CheckFailed);
        CheckOutcome::CheckFailed
    }

    async fn release_connection(&self) {
        let conn = {
            let mut session = self.session.lock().unwrap();
            match std::mem::replace(&mut *session, Session::Disconnected) {
                Session::Connected(conn) => Some(conn),
                _ => None,
            }
        };

        let Some(conn) = conn else { return };
        match conn.release().await {
            Ok(true) => debug!("Worker connection released"),
            Ok(false) => {
                // The worker refused: a download is still in flight. Keep
                // the connection; the terminal download event will come back
                // around to finish().
                warn!("Release refused mid-download; keeping the connection");
                *self.session.lock().unwrap() = Session::Connected(conn);
            }
            Err(_) => debug!("Worker already gone during release"),
        }
    }

    /// Deliver the outcome to the host callback, at most once per cycle
    fn deliver(&self, outcome: CheckOutcome) {
        if self.delivered.swap(true, Ordering::SeqCst) {
            debug!(%outcome, "Outcome already delivered this cycle");
            return;
        }
        info!(code = outcome.code(), %outcome, "Update cycle finished");
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(outcome);
        }
    }
}
