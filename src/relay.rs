//! System notification relay
//!
//! While a download runs, the worker broadcasts [`TransferPhase`] values over
//! a `watch` channel; the relay mirrors them into the persistent system
//! notification ("Downloading update {pct}%", progress `max=100`). It holds
//! no state of its own beyond the last value it published — it is a pure
//! side-effecting reporter, never a source of truth.
//!
//! The loop is event-driven: it sleeps on the channel and wakes only when
//! the value changes. If no change arrives within the configured stall
//! timeout the relay reports a stalled transfer and exits instead of
//! spinning, leaving the last published percentage visible until the worker
//! reaches a terminal state and clears the entry.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::TransferPhase;
use crate::host::StatusNotifier;

/// Why the relay loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The transfer completed; the notification was cleared
    Completed,
    /// The transfer failed; the notification was cleared
    Failed,
    /// No progress change arrived within the stall timeout
    Stalled,
}

/// Republishes transfer progress to the system notification facility
pub struct ProgressRelay {
    notifier: Arc<dyn StatusNotifier>,
    stall_timeout: Duration,
}

impl ProgressRelay {
    /// Create a relay publishing to `notifier`
    #[must_use]
    pub fn new(notifier: Arc<dyn StatusNotifier>, stall_timeout: Duration) -> Self {
        Self {
            notifier,
            stall_timeout,
        }
    }

    /// Run the relay until the transfer reaches a terminal state or stalls
    ///
    /// The published percentage never regresses: a lower value than the last
    /// published one is ignored. Observing 100% (or a terminal phase) clears
    /// the notification and ends the loop immediately.
    pub async fn run(self, mut phase_rx: watch::Receiver<TransferPhase>) -> RelayExit {
        let mut last_published: Option<u8> = None;

        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                TransferPhase::Idle => {}
                TransferPhase::Running(pct) if pct >= 100 => {
                    self.notifier.clear();
                    return RelayExit::Completed;
                }
                TransferPhase::Running(pct) => {
                    let pct = last_published.map_or(pct, |prev| pct.max(prev));
                    if last_published != Some(pct) {
                        self.notifier
                            .publish(&format!("Downloading update {pct}%"), pct);
                        last_published = Some(pct);
                    }
                }
                TransferPhase::Complete => {
                    self.notifier.clear();
                    return RelayExit::Completed;
                }
                TransferPhase::Failed => {
                    self.notifier.clear();
                    return RelayExit::Failed;
                }
            }

            match tokio::time::timeout(self.stall_timeout, phase_rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Publisher dropped without a terminal phase; do not
                    // leave a dangling notification behind
                    debug!("Transfer phase publisher dropped; clearing notification");
                    self.notifier.clear();
                    return RelayExit::Failed;
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.stall_timeout.as_secs(),
                        "Transfer progress stalled; suspending notification updates"
                    );
                    return RelayExit::Stalled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingNotifier;
    use std::sync::atomic::Ordering;

    fn relay_with(notifier: &Arc<RecordingNotifier>, timeout_ms: u64) -> ProgressRelay {
        ProgressRelay::new(
            Arc::clone(notifier) as Arc<dyn StatusNotifier>,
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_publishes_progress_and_clears_at_completion() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = watch::channel(TransferPhase::Running(0));

        let handle = tokio::spawn(relay_with(&notifier, 1000).run(rx));
        tokio::task::yield_now().await;
        tx.send(TransferPhase::Running(37)).unwrap();
        tokio::task::yield_now().await;
        tx.send(TransferPhase::Running(100)).unwrap();

        assert_eq!(handle.await.unwrap(), RelayExit::Completed);

        let published = notifier.published.lock().unwrap().clone();
        assert_eq!(
            published,
            vec![
                ("Downloading update 0%".to_string(), 0),
                ("Downloading update 37%".to_string(), 37),
            ]
        );
        assert_eq!(notifier.cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_published_percent_never_regresses() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = watch::channel(TransferPhase::Running(50));

        let handle = tokio::spawn(relay_with(&notifier, 1000).run(rx));
        tokio::task::yield_now().await;
        tx.send(TransferPhase::Running(30)).unwrap();
        tokio::task::yield_now().await;
        tx.send(TransferPhase::Complete).unwrap();

        assert_eq!(handle.await.unwrap(), RelayExit::Completed);

        let published = notifier.published.lock().unwrap().clone();
        assert_eq!(published, vec![("Downloading update 50%".to_string(), 50)]);
    }

    #[tokio::test]
    async fn test_failure_clears_without_publishing_completion() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = watch::channel(TransferPhase::Running(12));

        let handle = tokio::spawn(relay_with(&notifier, 1000).run(rx));
        tokio::task::yield_now().await;
        tx.send(TransferPhase::Failed).unwrap();

        assert_eq!(handle.await.unwrap(), RelayExit::Failed);
        assert_eq!(notifier.cleared.load(Ordering::SeqCst), 1);
        let published = notifier.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
    }

    #[tokio::test]
    async fn test_stall_exits_without_clearing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = watch::channel(TransferPhase::Running(10));

        let exit = relay_with(&notifier, 50).run(rx).await;
        assert_eq!(exit, RelayExit::Stalled);
        assert_eq!(notifier.cleared.load(Ordering::SeqCst), 0);

        drop(tx);
    }

    #[tokio::test]
    async fn test_dropped_publisher_clears_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = watch::channel(TransferPhase::Running(10));

        let handle = tokio::spawn(relay_with(&notifier, 1000).run(rx));
        tokio::task::yield_now().await;
        drop(tx);

        assert_eq!(handle.await.unwrap(), RelayExit::Failed);
        assert_eq!(notifier.cleared.load(Ordering::SeqCst), 1);
    }
}
