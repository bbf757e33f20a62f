//! Indexer loop tests: the full pipeline against temp storage.

use std::sync::Arc;

use bytes::Bytes;
use spectre_extract::ExtractorRegistry;
use spectre_graph::GraphStore;
use spectre_log::{Durability, EventLog};
use spectre_types::{
    EventType, GroupVersionKind, ObservedMutation, ResourceMetadata, TimestampNs, Uid,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::{
    HealthState, IndexCommand, IndexMetrics, Indexer, IndexerConfig, Watermark, derive_event_id,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn now_ns() -> TimestampNs {
    TimestampNs::new(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as i64,
    )
}

fn mutation(uid: &str, rv: &str, event_type: EventType, ts: TimestampNs) -> ObservedMutation {
    ObservedMutation {
        timestamp: ts,
        event_type,
        resource: ResourceMetadata::new(
            GroupVersionKind::new("apps", "v1", "Deployment"),
            "default",
            format!("deploy-{uid}"),
            Uid::new(uid),
        ),
        resource_version: rv.to_string(),
        data: Bytes::from(format!("{{\"spec\":{{\"replicas\":1}},\"metadata\":{{\"resourceVersion\":\"{rv}\"}}}}")),
    }
}

struct Fixture {
    _dir: TempDir,
    graph: Arc<GraphStore>,
    watermark: Arc<Watermark>,
    health: Arc<HealthState>,
    indexer: Indexer,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let log = std::sync::Arc::new(std::sync::Mutex::new(
        EventLog::open_with_durability(dir.path(), Durability::EveryN(1_000)).unwrap(),
    ));
    let graph = Arc::new(GraphStore::new());
    let watermark = Arc::new(Watermark::new());
    let health = Arc::new(HealthState::new());
    let metrics = IndexMetrics::register(&prometheus::Registry::new());
    let indexer = Indexer::new(
        log,
        Arc::clone(&graph),
        ExtractorRegistry::standard(),
        IndexerConfig::default(),
        Arc::clone(&watermark),
        Arc::clone(&health),
        metrics,
        dir.path().to_path_buf(),
    );
    Fixture {
        _dir: dir,
        graph,
        watermark,
        health,
        indexer,
    }
}

/// Runs the indexer over a finite mutation sequence and joins it.
fn run_to_completion(fixture: Fixture, mutations: Vec<ObservedMutation>) -> (Arc<GraphStore>, Arc<Watermark>, Arc<HealthState>) {
    let Fixture {
        _dir,
        graph,
        watermark,
        health,
        indexer,
    } = fixture;
    let (tx, rx) = mpsc::channel(64);
    let handle = indexer.spawn(rx);
    for m in mutations {
        tx.blocking_send(IndexCommand::Mutation(m)).unwrap();
    }
    drop(tx);
    handle.join().unwrap();
    (graph, watermark, health)
}

// ============================================================================
// Pipeline behavior
// ============================================================================

#[test]
fn event_lands_in_log_and_graph_exactly_once() {
    let ts = now_ns();
    let m = mutation("u1", "100", EventType::Create, ts);
    let expected_id = derive_event_id(&Uid::new("u1"), "100", EventType::Create);

    let (graph, watermark, health) =
        run_to_completion(fixture(), vec![m.clone(), m.clone(), m]);

    // Duplicate deliveries collapse to one change event.
    assert_eq!(graph.total_events(), 1);
    let node = graph.get_change_event(&expected_id).expect("change event");
    assert_eq!(node.uid, Uid::new("u1"));
    assert!(graph.find_resource_by_uid(&Uid::new("u1")).is_some());
    assert_eq!(watermark.get(), ts);
    assert!(health.is_healthy());
}

#[test]
fn watermark_advances_with_each_event() {
    let base = now_ns();
    let mutations = vec![
        mutation("u1", "1", EventType::Create, base),
        mutation("u1", "2", EventType::Update, base + 1_000),
        mutation("u2", "1", EventType::Create, base + 2_000),
    ];
    let (graph, watermark, _) = run_to_completion(fixture(), mutations);
    assert_eq!(graph.total_events(), 3);
    assert_eq!(watermark.get(), base + 2_000);
}

#[test]
fn recovery_replays_log_into_empty_graph() {
    let dir = TempDir::new().unwrap();
    let base = now_ns();

    // First life: index two events, but discard the graph (no snapshot).
    {
        let log = std::sync::Arc::new(std::sync::Mutex::new(
            EventLog::open_with_durability(dir.path(), Durability::EveryN(1_000)).unwrap(),
        ));
        let graph = Arc::new(GraphStore::new());
        let metrics = IndexMetrics::register(&prometheus::Registry::new());
        let indexer = Indexer::new(
            log,
            Arc::clone(&graph),
            ExtractorRegistry::standard(),
            IndexerConfig::default(),
            Arc::new(Watermark::new()),
            Arc::new(HealthState::new()),
            metrics,
            // Snapshots to a scratch dir the second life never reads.
            TempDir::new().unwrap().path().to_path_buf(),
        );
        let (tx, rx) = mpsc::channel(8);
        let handle = indexer.spawn(rx);
        tx.blocking_send(IndexCommand::Mutation(mutation("u1", "1", EventType::Create, base)))
            .unwrap();
        tx.blocking_send(IndexCommand::Mutation(mutation(
            "u2",
            "1",
            EventType::Create,
            base + 500,
        )))
        .unwrap();
        drop(tx);
        handle.join().unwrap();
    }

    // Second life: fresh graph, recovery replays from the log alone.
    let log = std::sync::Arc::new(std::sync::Mutex::new(
        EventLog::open_with_durability(dir.path(), Durability::EveryN(1_000)).unwrap(),
    ));
    let graph = Arc::new(GraphStore::new());
    let watermark = Arc::new(Watermark::new());
    let metrics = IndexMetrics::register(&prometheus::Registry::new());
    let mut indexer = Indexer::new(
        log,
        Arc::clone(&graph),
        ExtractorRegistry::standard(),
        IndexerConfig::default(),
        Arc::clone(&watermark),
        Arc::new(HealthState::new()),
        metrics,
        dir.path().to_path_buf(),
    );

    let replayed = indexer.recover().unwrap();
    assert_eq!(replayed, 2);
    assert_eq!(graph.total_events(), 2);
    assert!(graph.find_resource_by_uid(&Uid::new("u1")).is_some());
    assert!(graph.find_resource_by_uid(&Uid::new("u2")).is_some());
    assert!(watermark.get() >= base + 500);

    // Nothing new: a second recover is a no-op.
    assert_eq!(indexer.recover().unwrap(), 0);
}

#[test]
fn registry_swap_applies_to_later_events() {
    let base = now_ns();

    let mut rs = mutation("uid-rs", "1", EventType::Create, base);
    rs.resource.gvk = GroupVersionKind::new("apps", "v1", "ReplicaSet");
    let owned_pod = |id: &str, rv: &str, ts: TimestampNs| {
        let mut pod = mutation(id, rv, EventType::Create, ts);
        pod.resource.gvk = GroupVersionKind::core("v1", "Pod");
        pod.data = Bytes::from(
            serde_json::json!({"metadata": {"ownerReferences": [
                {"kind": "ReplicaSet", "name": "web", "uid": "uid-rs", "controller": true}
            ]}})
            .to_string(),
        );
        pod
    };

    let Fixture {
        _dir,
        graph,
        watermark: _,
        health: _,
        indexer,
    } = fixture();
    let (tx, rx) = mpsc::channel(16);
    let handle = indexer.spawn(rx);

    tx.blocking_send(IndexCommand::Mutation(rs)).unwrap();
    tx.blocking_send(IndexCommand::Mutation(owned_pod("p1", "1", base + 100)))
        .unwrap();
    // An empty registry: subsequent events produce no edges.
    tx.blocking_send(IndexCommand::SwapRegistry(ExtractorRegistry::new(vec![])))
        .unwrap();
    tx.blocking_send(IndexCommand::Mutation(owned_pod("p2", "1", base + 200)))
        .unwrap();
    drop(tx);
    handle.join().unwrap();

    assert!(
        graph
            .get_edge(
                &Uid::new("uid-rs"),
                spectre_types::EdgeType::Owns,
                &Uid::new("p1")
            )
            .is_some(),
        "edge extracted before the swap"
    );
    assert!(
        graph
            .get_edge(
                &Uid::new("uid-rs"),
                spectre_types::EdgeType::Owns,
                &Uid::new("p2")
            )
            .is_none(),
        "no extraction after swapping in the empty registry"
    );
}

#[test]
fn owner_chain_builds_edges_through_pipeline() {
    let base = now_ns();
    let mut rs = mutation("uid-rs", "1", EventType::Create, base);
    rs.resource.gvk = GroupVersionKind::new("apps", "v1", "ReplicaSet");
    rs.resource.name = "web-abc".to_string();

    let mut pod = mutation("uid-pod", "1", EventType::Create, base + 100);
    pod.resource.gvk = GroupVersionKind::core("v1", "Pod");
    pod.resource.name = "web-abc-1".to_string();
    pod.data = Bytes::from(
        serde_json::json!({"metadata": {"ownerReferences": [
            {"kind": "ReplicaSet", "name": "web-abc", "uid": "uid-rs", "controller": true}
        ]}})
        .to_string(),
    );

    let (graph, _, _) = run_to_completion(fixture(), vec![rs, pod]);
    assert!(
        graph
            .get_edge(
                &Uid::new("uid-rs"),
                spectre_types::EdgeType::Owns,
                &Uid::new("uid-pod")
            )
            .is_some()
    );
}
