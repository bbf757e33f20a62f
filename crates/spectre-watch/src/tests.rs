//! Reloader reconciliation tests.
//!
//! The kube client here points at a closed port: watch tasks spin in their
//! discovery retry loop and never produce events, which is all these tests
//! need — they exercise the desired-vs-running diff, not the API.

use std::sync::Arc;
use std::time::Duration;

use spectre_types::{ClockSource, GroupVersionKind};
use tempfile::tempdir;

use crate::{ConfigReloader, WatchManager, WatchMetrics};

fn offline_manager() -> WatchManager {
    let config = kube::Config::new("http://127.0.0.1:8".try_into().expect("static uri"));
    let client = kube::Client::try_from(config).expect("offline client");
    let metrics = WatchMetrics::register(&prometheus::Registry::new());
    WatchManager::new(client, 8, Arc::new(ClockSource::new()), metrics)
}

#[tokio::test]
async fn reconcile_starts_and_stops_to_match_the_document() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("watch.yaml");
    std::fs::write(&path, "resources:\n  - version: v1\n    kind: Pod\n").unwrap();

    let mut manager = offline_manager();
    let mut reloader = ConfigReloader::new(path.clone(), Duration::from_secs(3_600));

    reloader.reconcile(&mut manager).await;
    let running: Vec<GroupVersionKind> = manager.running().into_keys().collect();
    assert_eq!(running, vec![GroupVersionKind::core("v1", "Pod")]);

    // Same fingerprint: nothing to do.
    reloader.reconcile(&mut manager).await;
    assert_eq!(manager.running().len(), 1);

    // Replace Pod with StatefulSet: start before stop, end state matches.
    std::fs::write(
        &path,
        "resources:\n  - group: apps\n    version: v1\n    kind: StatefulSet\n",
    )
    .unwrap();
    reloader.reconcile(&mut manager).await;
    let running: Vec<GroupVersionKind> = manager.running().into_keys().collect();
    assert_eq!(
        running,
        vec![GroupVersionKind::new("apps", "v1", "StatefulSet")]
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn invalid_document_keeps_previous_configuration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("watch.yaml");
    std::fs::write(&path, "resources:\n  - version: v1\n    kind: Pod\n").unwrap();

    let mut manager = offline_manager();
    let mut reloader = ConfigReloader::new(path.clone(), Duration::from_secs(3_600));
    reloader.reconcile(&mut manager).await;
    assert_eq!(manager.running().len(), 1);

    // A schema violation (empty kind) is reported; the Pod watch stays.
    std::fs::write(&path, "resources:\n  - version: v1\n    kind: \"\"\n").unwrap();
    reloader.reconcile(&mut manager).await;
    let running: Vec<GroupVersionKind> = manager.running().into_keys().collect();
    assert_eq!(running, vec![GroupVersionKind::core("v1", "Pod")]);

    // An unreadable document also keeps the previous configuration.
    std::fs::remove_file(&path).unwrap();
    reloader.reconcile(&mut manager).await;
    assert_eq!(manager.running().len(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn events_stream_can_be_taken_once() {
    let mut manager = offline_manager();
    assert!(manager.events().is_ok());
    assert!(matches!(
        manager.events(),
        Err(crate::WatchError::StreamTaken)
    ));
}
