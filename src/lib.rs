//! Airlift - Over-the-Air Update Coordinator
//!
//! A library for coordinating application self-updates: query a remote
//! endpoint for the latest build, decide whether an update is required or
//! mandatory, optionally prompt the user, download the artifact while
//! reporting progress to both the user interface and a persistent
//! system-level notification, and hand the downloaded artifact to an
//! installer.
//!
//! # Architecture Overview
//!
//! The system is split into two independently-lifecycled halves:
//!
//! - [`worker`] — a long-lived background actor that owns the
//!   check/download state machine. It survives its foreground controller
//!   going away and is never torn down while a download is in flight.
//! - [`coordinator`] — a cheap, screen-scoped policy layer that connects to
//!   the worker, decides when dialogs appear, and reports exactly one
//!   terminal [`CheckOutcome`](core::CheckOutcome) per check cycle.
//!
//! Between them sits an explicit connection object ([`connection`]) with
//! `Disconnected → Connecting → Connected` states; releasing it is refused
//! while a download runs.
//!
//! ## Key Invariants
//!
//! - A server response reporting a build older than the running build never
//!   triggers an update, regardless of the server's own flag ([`model`]).
//! - Only one check is in flight at a time; a second `start()` while a
//!   check is pending issues no second network call.
//! - The worker connection is never released mid-download, for every
//!   interleaving of release attempts and transfer completion.
//! - The user's decline of a non-mandatory update is a one-shot,
//!   process-wide decision ([`host::UpdateRuntime`]) until the host
//!   explicitly resets it.
//!
//! # Core Modules
//!
//! - [`core`] — error types, terminal outcome codes, transfer phases
//! - [`model`] — version metadata and the defensive build clamp
//! - [`config`] — endpoint, transfer tuning, and UI policy (TOML)
//! - [`query`] — the one-shot version check client
//! - [`download`] — streaming artifact transfer with progress
//! - [`relay`] — system-notification republisher with stall detection
//! - [`worker`] — the background update actor
//! - [`connection`] — worker service and connection handles
//! - [`coordinator`] — the foreground policy layer
//! - [`host`] — traits the embedding application implements
//! - [`cli`] — console front-end driving the full workflow
//!
//! # Example
//!
//! ```rust,no_run
//! use airlift::config::UpdateConfig;
//! use airlift::connection::WorkerService;
//! use airlift::coordinator::UpdateCoordinator;
//! use airlift::host::UpdateRuntime;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     frontend: Arc<dyn airlift::host::UpdateFrontend>,
//! #     network: Arc<dyn airlift::host::NetworkMonitor>,
//! #     notifier: Arc<dyn airlift::host::StatusNotifier>,
//! #     installer: Arc<dyn airlift::host::Installer>,
//! #     host: Arc<dyn airlift::host::HostHandle>,
//! # ) -> anyhow::Result<()> {
//! let config = Arc::new(UpdateConfig {
//!     endpoint: "https://updates.example.com/api/version".into(),
//!     ..Default::default()
//! });
//!
//! // Once per process
//! let runtime = UpdateRuntime::new();
//! runtime.reset_cancel_flag();
//! let service = WorkerService::with_http(config, notifier, installer, Arc::clone(&host))?;
//!
//! // Per screen
//! let coordinator = UpdateCoordinator::new(service, runtime, frontend, network, host, 42);
//! coordinator.set_outcome_handler(Arc::new(|outcome| {
//!     println!("update cycle finished: {outcome}");
//! }));
//! coordinator.start().await;
//! # Ok(())
//! # }
//! ```

// Core functionality modules
pub mod config;
pub mod core;
pub mod model;

// Boundary clients
pub mod download;
pub mod query;

// Orchestration
pub mod connection;
pub mod coordinator;
pub mod relay;
pub mod worker;

// Host integration
pub mod host;

// Front-end
pub mod cli;

// Supporting modules
pub mod utils;

// test_utils is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
