//! Full-pipeline tests over a loopback update server

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

use airlift::config::{PolicyConfig, UpdateConfig};
use airlift::connection::WorkerService;
use airlift::coordinator::UpdateCoordinator;
use airlift::core::CheckOutcome;
use airlift::download::DownloadEngine;
use airlift::host::{
    HostHandle, Installer, NetworkKind, NetworkMonitor, StatusNotifier, UpdateFrontend,
    UpdateRuntime, PACKAGE_MIME,
};
use airlift::test_utils::{
    RecordingHost, RecordingInstaller, RecordingNotifier, ScriptedFrontend, StaticNetwork,
};

/// Serve a version document and an artifact from a loopback listener
///
/// The version endpoint reports `latest_build` with the artifact URL pointed
/// back at this same server.
async fn start_update_server(
    latest_build: u64,
    need_upgrade: bool,
    must_upgrade: bool,
    artifact: Vec<u8>,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let upgrade_url = format!("{base}/artifacts/app-{latest_build}.apk");
    let app = Router::new()
        .route(
            "/api/version",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let upgrade_url = upgrade_url.clone();
                async move {
                    // The client identifies itself the same way on every check
                    assert_eq!(params.get("q").map(String::as_str), Some("needUpgrade"));
                    assert_eq!(params.get("client").map(String::as_str), Some("android"));
                    Json(serde_json::json!({
                        "build": latest_build,
                        "description": "Stability fixes",
                        "upgradeUrl": upgrade_url,
                        "needUpgrade": need_upgrade,
                        "mustUpgrade": must_upgrade,
                    }))
                }
            }),
        )
        .route(
            "/artifacts/{name}",
            get(move || {
                let artifact = artifact.clone();
                async move { artifact }
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base
}

struct Pipeline {
    coordinator: Arc<UpdateCoordinator>,
    runtime: Arc<UpdateRuntime>,
    frontend: Arc<ScriptedFrontend>,
    notifier: Arc<RecordingNotifier>,
    installer: Arc<RecordingInstaller>,
    host: Arc<RecordingHost>,
    temp: TempDir,
}

fn pipeline(base: &str, frontend: Arc<ScriptedFrontend>, kind: NetworkKind) -> Pipeline {
    let temp = TempDir::new().unwrap();
    let config = Arc::new(UpdateConfig {
        endpoint: format!("{base}/api/version"),
        cache_dir: Some(temp.path().to_path_buf()),
        policy: PolicyConfig {
            show_prompt_on_non_mandatory: true,
            toast_on_no_update: false,
        },
        ..Default::default()
    });

    let runtime = UpdateRuntime::new();
    let notifier = RecordingNotifier::new();
    let installer = RecordingInstaller::new();
    let host = RecordingHost::new();

    let service = WorkerService::with_http(
        config,
        Arc::clone(&notifier) as Arc<dyn StatusNotifier>,
        Arc::clone(&installer) as Arc<dyn Installer>,
        Arc::clone(&host) as Arc<dyn HostHandle>,
    )
    .unwrap();

    let coordinator = UpdateCoordinator::new(
        service,
        Arc::clone(&runtime),
        Arc::clone(&frontend) as Arc<dyn UpdateFrontend>,
        StaticNetwork::new(kind) as Arc<dyn NetworkMonitor>,
        Arc::clone(&host) as Arc<dyn HostHandle>,
        10,
    );

    Pipeline {
        coordinator,
        runtime,
        frontend,
        notifier,
        installer,
        host,
        temp,
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition never satisfied"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_accepted_update_downloads_artifact_and_hands_off() {
    let payload: Vec<u8> = (0..32768u32).flat_map(|n| n.to_le_bytes()).collect();
    let base = start_update_server(12, true, false, payload.clone()).await;
    let p = pipeline(&base, ScriptedFrontend::accepting(), NetworkKind::Wifi);

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::NeedUpdate));

    // The artifact landed in the cache under its hash-derived name
    let expected_name = DownloadEngine::artifact_file_name(&format!("{base}/artifacts/app-12.apk"));
    let artifact_path = p.temp.path().join(&expected_name);
    assert_eq!(tokio::fs::read(&artifact_path).await.unwrap(), payload);

    // Progress reached the frontend monotonically and finished at 100%
    let progress = p.frontend.progress.lock().unwrap().clone();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last().unwrap().0, 1.0);

    // System notification was cleared, keepalive dropped
    assert!(p.notifier.was_cleared());
    assert!(!p.host.keepalive_active.load(Ordering::SeqCst));

    // Fire-and-forget installer handoff with the package MIME
    wait_for(|| !p.installer.installs.lock().unwrap().is_empty()).await;
    let installs = p.installer.installs.lock().unwrap();
    assert_eq!(installs[0].0, artifact_path);
    assert_eq!(installs[0].1, PACKAGE_MIME);
}

#[tokio::test]
async fn test_mandatory_update_shows_blocking_indicator() {
    let base = start_update_server(12, true, true, b"mandatory artifact".to_vec()).await;
    let p = pipeline(&base, ScriptedFrontend::accepting(), NetworkKind::Wifi);

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::NeedUpdate));

    // The decision prompt offered no decline, the indicator was blocking
    assert_eq!(*p.frontend.prompts.lock().unwrap(), vec![false]);
    assert_eq!(*p.frontend.download_starts.lock().unwrap(), vec![true]);
    assert_eq!(p.frontend.download_finishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_update_short_circuits() {
    let base = start_update_server(12, false, false, Vec::new()).await;
    let p = pipeline(&base, ScriptedFrontend::accepting(), NetworkKind::Wifi);

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::NoUpdate));
    assert_eq!(p.frontend.prompt_count(), 0);
    assert_eq!(*p.runtime.subscribe_availability().borrow(), Some(false));
}

#[tokio::test]
async fn test_server_reporting_older_build_never_updates() {
    // Server insists needUpgrade=true but its build is older than ours
    let base = start_update_server(7, true, false, Vec::new()).await;
    let p = pipeline(&base, ScriptedFrontend::accepting(), NetworkKind::Wifi);

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::NoUpdate));
    assert_eq!(p.frontend.prompt_count(), 0);
}

#[tokio::test]
async fn test_unreachable_server_reports_check_failed() {
    // Bind and drop so nothing is listening on the port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let p = pipeline(
        &format!("http://{addr}"),
        ScriptedFrontend::accepting(),
        NetworkKind::Wifi,
    );

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::CheckFailed));

    // A failed check suppresses further cycles until the host resets
    assert!(p.runtime.is_canceled());
    assert!(p.coordinator.start().await.is_none());
    p.runtime.reset_cancel_flag();
}

#[tokio::test]
async fn test_metered_network_confirmation_interposes() {
    let base = start_update_server(12, true, false, b"artifact".to_vec()).await;
    let p = pipeline(&base, ScriptedFrontend::accepting(), NetworkKind::Metered);

    let outcome = p.coordinator.start().await;
    assert_eq!(outcome, Some(CheckOutcome::NeedUpdate));
    assert_eq!(p.frontend.metered_confirms.load(Ordering::SeqCst), 1);
}
