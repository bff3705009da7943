//! Host environment boundary
//!
//! Everything the update system needs from its surroundings is expressed
//! here as a trait: prompting the user, publishing a persistent system
//! notification, handing an artifact to the installer, classifying the
//! active network, and process-level concerns (keepalive, forced exit).
//! The library never renders UI or touches platform services directly — a
//! host wires in implementations and the coordinator decides *when* to call
//! them and *what* they must offer.
//!
//! [`UpdateRuntime`] is the one piece of deliberately shared mutable state:
//! the process-wide cancellation flag, the two dialog gates, and the sticky
//! update-availability broadcast. Hosts create it once at startup and pass
//! it to every coordinator they construct.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::core::UpdateError;
use crate::model::UpdateModel;

/// MIME type identifying an installable package in the installer handoff
pub const PACKAGE_MIME: &str = "application/vnd.android.package-archive";

/// Kind of network the device is currently on
///
/// Consumed as an oracle when the user accepts an update: Wi-Fi downloads
/// start immediately, anything else goes through the metered-data
/// confirmation first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Unmetered Wi-Fi connection
    Wifi,
    /// Metered connection (cellular data)
    Metered,
    /// No usable connection
    Disconnected,
}

/// Oracle for the current network type
pub trait NetworkMonitor: Send + Sync {
    /// Classify the currently active network
    fn network_kind(&self) -> NetworkKind;
}

/// Persistent system-level progress notification
///
/// Implementations own a single logical entry (fixed id); repeated
/// [`publish`](Self::publish) calls update it in place. The entry is ongoing
/// and not dismissible by the user — only [`clear`](Self::clear) removes it.
pub trait StatusNotifier: Send + Sync {
    /// Create or update the entry with the given title and progress
    /// (`max=100, value=percent`)
    fn publish(&self, title: &str, percent: u8);

    /// Remove the entry
    fn clear(&self);
}

/// Installer collaborator for the downloaded artifact
///
/// The worker dispatches the artifact path here after a successful download
/// and does not await or observe the outcome.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Launch installation of the artifact at `path` with the given MIME type
    async fn install(&self, path: &Path, mime: &str) -> Result<(), UpdateError>;
}

/// Process-level host services
pub trait HostHandle: Send + Sync {
    /// Mark the background worker as foreground-critical
    ///
    /// Raised before a download starts; while raised, the host must not
    /// reclaim the worker even if the foreground controller goes away.
    fn raise_keepalive(&self);

    /// Clear the foreground-critical marker
    fn clear_keepalive(&self);

    /// Terminate the host process
    ///
    /// Invoked only when the user declines a mandatory update.
    fn exit_app(&self);
}

/// User's answer to the update decision prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Start the download now
    UpdateNow,
    /// Decline the update (only offered for non-mandatory updates)
    Later,
}

/// User's answer to the metered-data confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteredChoice {
    /// Download over the metered connection anyway
    Proceed,
    /// Defer the download
    Defer,
}

/// User-facing surface driven by the coordinator
///
/// Implementations render dialogs, toasts, and the in-app progress
/// indicator however the host sees fit; the coordinator only decides when
/// each appears and which choices it must offer. All methods are invoked
/// from the UI-owning task.
#[async_trait]
pub trait UpdateFrontend: Send + Sync {
    /// Show the update decision dialog and wait for the user's choice
    ///
    /// When `cancelable` is `false` (mandatory update) the dialog must not
    /// offer a decline action; implementations may only return
    /// [`PromptChoice::UpdateNow`] in that case.
    async fn prompt_update(&self, model: &UpdateModel, cancelable: bool) -> PromptChoice;

    /// Show the metered-data confirmation and wait for the user's choice
    async fn confirm_metered(&self) -> MeteredChoice;

    /// Surface a transient informational message
    fn toast(&self, message: &str);

    /// A download began; `blocking` requests a non-cancelable, non-dismissible
    /// progress indicator (mandatory updates only)
    fn download_started(&self, blocking: bool);

    /// Update the in-app progress indicator
    fn download_progress(&self, fraction: f32, total_bytes: u64);

    /// Dismiss the progress indicator (success or failure)
    fn download_finished(&self);
}

/// Process-scoped shared state for the update system
///
/// Survives across coordinator instances (screens come and go, this does
/// not). Holds:
/// - the one-shot cancellation flag, set when the user declines a
///   non-mandatory update and cleared only through
///   [`reset_cancel_flag`](Self::reset_cancel_flag) at well-defined host
///   startup points;
/// - the two dialog gates (decision prompt visible, blocking progress
///   indicator visible) consulted before tearing down a worker connection;
/// - a sticky broadcast of the last known update availability, replayed to
///   late subscribers.
#[derive(Debug)]
pub struct UpdateRuntime {
    canceled: AtomicBool,
    prompt_gate: AtomicBool,
    progress_gate: AtomicBool,
    availability_tx: watch::Sender<Option<bool>>,
}

impl UpdateRuntime {
    /// Create the process-scoped runtime state
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (availability_tx, _) = watch::channel(None);
        Arc::new(Self {
            canceled: AtomicBool::new(false),
            prompt_gate: AtomicBool::new(false),
            progress_gate: AtomicBool::new(false),
            availability_tx,
        })
    }

    /// Whether the user has canceled update checking for this cycle
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Record that the user declined a non-mandatory update
    pub fn set_canceled(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Clear the cancellation flag
    ///
    /// Exposed for the host's startup sequence (e.g., cold start) so a
    /// decline in a previous session does not suppress checks forever.
    pub fn reset_cancel_flag(&self) {
        self.canceled.store(false, Ordering::SeqCst);
    }

    /// Whether either blocking dialog is currently visible
    #[must_use]
    pub fn dialog_visible(&self) -> bool {
        self.prompt_gate.load(Ordering::SeqCst) || self.progress_gate.load(Ordering::SeqCst)
    }

    /// Mark the decision prompt as visible or hidden
    pub fn set_prompt_visible(&self, visible: bool) {
        self.prompt_gate.store(visible, Ordering::SeqCst);
    }

    /// Mark the blocking progress indicator as visible or hidden
    pub fn set_progress_visible(&self, visible: bool) {
        self.progress_gate.store(visible, Ordering::SeqCst);
    }

    /// Publish the latest update availability (sticky)
    pub fn publish_availability(&self, update_available: bool) {
        // send_replace never fails even with no subscribers
        self.availability_tx.send_replace(Some(update_available));
    }

    /// Subscribe to update availability
    ///
    /// New subscribers immediately observe the last published value, if any.
    #[must_use]
    pub fn subscribe_availability(&self) -> watch::Receiver<Option<bool>> {
        self.availability_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_lifecycle() {
        let runtime = UpdateRuntime::new();
        assert!(!runtime.is_canceled());

        runtime.set_canceled();
        assert!(runtime.is_canceled());

        runtime.reset_cancel_flag();
        assert!(!runtime.is_canceled());
    }

    #[test]
    fn test_dialog_gates_are_independent() {
        let runtime = UpdateRuntime::new();
        assert!(!runtime.dialog_visible());

        runtime.set_prompt_visible(true);
        assert!(runtime.dialog_visible());
        runtime.set_prompt_visible(false);
        assert!(!runtime.dialog_visible());

        runtime.set_progress_visible(true);
        assert!(runtime.dialog_visible());
        runtime.set_progress_visible(false);
        assert!(!runtime.dialog_visible());
    }

    #[test]
    fn test_availability_is_sticky() {
        let runtime = UpdateRuntime::new();
        runtime.publish_availability(true);

        // A subscriber arriving after the publish still sees the value
        let rx = runtime.subscribe_availability();
        assert_eq!(*rx.borrow(), Some(true));
    }
}
