pub mod builders;
pub mod fake_poller;

use std::sync::Once;
use std::time::Duration;

use kapply::Event;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=kapply=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Drain a run's event stream until it closes.
pub async fn collect_events(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    with_timeout(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    })
    .await
}

/// Compact one-line rendering of an event, for order assertions.
pub fn describe(event: &Event) -> String {
    match event {
        Event::Init { .. } => "init".to_string(),
        Event::ActionGroupStart { group, .. } => format!("start {group}"),
        Event::ActionGroupFinish { group, .. } => format!("finish {group}"),
        Event::Apply { id, status, .. } => format!("apply {} {status:?}", id.name),
        Event::Prune { id, status, .. } => format!("prune {} {status:?}", id.name),
        Event::Delete { id, status, .. } => format!("delete {} {status:?}", id.name),
        Event::Wait { id, status, .. } => format!("wait {} {status:?}", id.name),
        Event::StatusUpdate(s) => format!("status {} {:?}", s.id.name, s.status),
        Event::Error { error, fatal } => format!("error {:?} fatal={fatal}", error.kind),
    }
}

/// [`describe`] every event except status updates, whose timing depends on
/// the poller.
pub fn timeline(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter(|e| !matches!(e, Event::StatusUpdate(_)))
        .map(describe)
        .collect()
}
