use super::*;
use crate::test_utils::{
    version_doc, RecordingHost, RecordingInstaller, RecordingNotifier, ScriptedFetcher,
    ScriptedQuery,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

struct Harness {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    notifier: Arc<RecordingNotifier>,
    installer: Arc<RecordingInstaller>,
    host: Arc<RecordingHost>,
    _temp: TempDir,
}

async fn harness(query: Arc<dyn VersionQuery>, fetcher: Arc<dyn ArtifactFetcher>) -> Harness {
    let temp = TempDir::new().unwrap();
    let config = Arc::new(UpdateConfig {
        endpoint: "https://updates.example.com/api/version".to_string(),
        cache_dir: Some(temp.path().to_path_buf()),
        stall_timeout_secs: 5,
        ..Default::default()
    });

    let notifier = RecordingNotifier::new();
    let installer = RecordingInstaller::new();
    let host = RecordingHost::new();

    let commands = spawn(
        config,
        query,
        fetcher,
        Arc::clone(&notifier) as Arc<dyn StatusNotifier>,
        Arc::clone(&installer) as Arc<dyn Installer>,
        Arc::clone(&host) as Arc<dyn HostHandle>,
    );

    let (events_tx, events) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = oneshot::channel();
    commands
        .send(WorkerCommand::Attach {
            events: events_tx,
            ack: ack_tx,
        })
        .unwrap();
    ack_rx.await.unwrap();

    Harness {
        commands,
        events,
        notifier,
        installer,
        host,
        _temp: temp,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for worker event")
        .expect("worker event channel closed")
}

async fn query_downloading(commands: &mpsc::UnboundedSender<WorkerCommand>) -> bool {
    let (reply, rx) = oneshot::channel();
    commands
        .send(WorkerCommand::IsDownloading { reply })
        .unwrap();
    rx.await.unwrap()
}

async fn query_model(commands: &mpsc::UnboundedSender<WorkerCommand>) -> Option<UpdateModel> {
    let (reply, rx) = oneshot::channel();
    commands.send(WorkerCommand::Model { reply }).unwrap();
    rx.await.unwrap()
}

async fn detach(commands: &mpsc::UnboundedSender<WorkerCommand>) -> bool {
    let (ack, rx) = oneshot::channel();
    commands.send(WorkerCommand::Detach { ack }).unwrap();
    rx.await.unwrap()
}

#[tokio::test]
async fn test_check_stores_clamped_model_and_emits_success() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();

    match next_event(&mut h.events).await {
        WorkerEvent::CheckSucceeded(model) => {
            assert_eq!(model.latest_build, 12);
            assert_eq!(model.current_build, 10);
            assert!(model.needs_upgrade);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let model = query_model(&h.commands).await.unwrap();
    assert_eq!(model.latest_build, 12);
}

#[tokio::test]
async fn test_check_applies_defensive_clamp_for_stale_server_build() {
    // Server insists an upgrade is needed but reports an older build
    let query = ScriptedQuery::ok(version_doc(8, true, false));
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();

    match next_event(&mut h.events).await {
        WorkerEvent::CheckSucceeded(model) => assert!(!model.needs_upgrade),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_second_check_while_in_flight_is_dropped() {
    let (query, gate) = ScriptedQuery::gated(version_doc(12, true, false));
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(Arc::clone(&query) as Arc<dyn VersionQuery>, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();
    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();

    gate.add_permits(1);

    match next_event(&mut h.events).await {
        WorkerEvent::CheckSucceeded(_) => {}
        other => panic!("unexpected event: {other:?}"),
    }

    // Exactly one network call despite two check commands
    assert_eq!(query.call_count(), 1);

    // And no second result is pending
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_check_failure_returns_to_idle() {
    let query = ScriptedQuery::err(UpdateError::NetworkUnavailable {
        operation: "version check".to_string(),
        reason: "connection refused".to_string(),
    });
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();

    match next_event(&mut h.events).await {
        WorkerEvent::CheckFailed(UpdateError::NetworkUnavailable { .. }) => {}
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(query_model(&h.commands).await.is_none());

    // A download in this state is rejected
    h.commands.send(WorkerCommand::Download).unwrap();
    match next_event(&mut h.events).await {
        WorkerEvent::DownloadFailed(UpdateError::NoPendingUpdate) => {}
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_download_without_check_is_rejected() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(query, fetcher).await;

    h.commands.send(WorkerCommand::Download).unwrap();

    match next_event(&mut h.events).await {
        WorkerEvent::DownloadFailed(UpdateError::NoPendingUpdate) => {}
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!query_downloading(&h.commands).await);
}

#[tokio::test]
async fn test_successful_download_flow() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let payload = b"artifact bytes".to_vec();
    let fetcher = ScriptedFetcher::ok(
        payload.clone(),
        vec![(0.0, 1000), (0.37, 1000), (1.0, 1000)],
    );
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::CheckSucceeded(_)
    ));

    h.commands.send(WorkerCommand::Download).unwrap();

    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::DownloadBegan
    ));

    let mut fractions = Vec::new();
    let path = loop {
        match next_event(&mut h.events).await {
            WorkerEvent::DownloadProgress { fraction, .. } => fractions.push(fraction),
            WorkerEvent::DownloadSucceeded(path) => break path,
            other => panic!("unexpected event: {other:?}"),
        }
    };

    assert_eq!(fractions, vec![0.0, 0.37, 1.0]);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), payload);

    // Keepalive was raised for the transfer and is now clear
    assert_eq!(h.host.keepalive_raised.load(Ordering::SeqCst), 1);
    assert!(!h.host.keepalive_active.load(Ordering::SeqCst));
    assert!(!query_downloading(&h.commands).await);
    assert!(h.notifier.was_cleared());

    // Fire-and-forget installer handoff lands shortly after the event
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        {
            let installs = h.installer.installs.lock().unwrap();
            if !installs.is_empty() {
                assert_eq!(installs[0].0, path);
                assert_eq!(installs[0].1, PACKAGE_MIME);
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "installer never invoked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_failed_download_clears_state_and_notification() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let fetcher = ScriptedFetcher::err(
        UpdateError::DownloadFailure {
            url: "https://updates.example.com/builds/app-12.apk".to_string(),
            reason: "connection reset".to_string(),
        },
        vec![(0.0, 1000)],
    );
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::CheckSucceeded(_)
    ));
    h.commands.send(WorkerCommand::Download).unwrap();

    loop {
        match next_event(&mut h.events).await {
            WorkerEvent::DownloadFailed(UpdateError::DownloadFailure { .. }) => break,
            WorkerEvent::DownloadBegan | WorkerEvent::DownloadProgress { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert!(!query_downloading(&h.commands).await);
    assert!(!h.host.keepalive_active.load(Ordering::SeqCst));
    assert!(h.notifier.was_cleared());
    assert!(h.installer.installs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_detach_refused_while_downloading() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let (fetcher, gate) = ScriptedFetcher::gated(Vec::new(), vec![(0.1, 100)]);
    let mut h = harness(query, Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::CheckSucceeded(_)
    ));
    h.commands.send(WorkerCommand::Download).unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::DownloadBegan
    ));

    // The transfer is held open at the gate: release must be refused
    assert!(query_downloading(&h.commands).await);
    assert!(!detach(&h.commands).await);

    // Still attached: finishing the transfer reaches us
    gate.add_permits(1);
    loop {
        match next_event(&mut h.events).await {
            WorkerEvent::DownloadSucceeded(_) => break,
            WorkerEvent::DownloadProgress { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // Terminal state reached: release is accepted and the model is dropped
    assert!(detach(&h.commands).await);
    assert!(query_model(&h.commands).await.is_none());
}

#[tokio::test]
async fn test_detach_drops_model_and_event_sink() {
    let query = ScriptedQuery::ok(version_doc(12, true, false));
    let fetcher = ScriptedFetcher::ok(Vec::new(), Vec::new());
    let mut h = harness(query, fetcher).await;

    h.commands
        .send(WorkerCommand::Check { current_build: 10 })
        .unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        WorkerEvent::CheckSucceeded(_)
    ));
    assert!(query_model(&h.commands).await.is_some());

    assert!(detach(&h.commands).await);
    assert!(query_model(&h.commands).await.is_none());

    // The worker dropped its sender half; the event stream ends
    assert!(h.events.recv().await.is_none());
}
