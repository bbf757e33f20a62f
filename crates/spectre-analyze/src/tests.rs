//! Analyzer tests, including the managed-HelmRelease scenario end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spectre_graph::{EdgeProps, EdgeUpsert, GraphStore};
use spectre_types::{
    EdgeType, Event, EventId, EventType, GroupVersionKind, ResourceMetadata, TimestampNs, Uid,
    ValidationState,
};

use crate::{AnalyzeError, Analyzer, RootCauseQuery, CONFIDENCE_CAP};

// ============================================================================
// Test Helpers
// ============================================================================

fn base_ts() -> TimestampNs {
    TimestampNs::from_secs(1_700_000_000)
}

fn apply_event(
    graph: &GraphStore,
    id: &str,
    gvk: GroupVersionKind,
    namespace: &str,
    name: &str,
    uid: &str,
    event_type: EventType,
    ts: TimestampNs,
    data: serde_json::Value,
) {
    let event = Event {
        id: EventId::new(id),
        timestamp: ts,
        event_type,
        resource: ResourceMetadata::new(gvk, namespace, name, Uid::new(uid)),
        data: Bytes::from(data.to_string()),
    };
    graph.upsert_resource_identity(&event);
    graph.record_change_event(&event);
}

fn structural_edge(graph: &GraphStore, from: &str, edge_type: EdgeType, to: &str, ts: TimestampNs) {
    assert!(
        graph.upsert_edge(
            EdgeUpsert::structural(Uid::new(from), edge_type, Uid::new(to)),
            ts,
        ),
        "edge endpoints must exist"
    );
}

/// Builds the S6-style cluster picture:
/// HelmRelease -MANAGES-> Deployment -OWNS-> ReplicaSet -OWNS-> Pod,
/// Pod -SCHEDULED_ON-> Node, Pod -USES_SERVICE_ACCOUNT-> ServiceAccount,
/// ClusterRoleBinding -GRANTS_TO-> ServiceAccount.
///
/// At `t+120s` the HelmRelease image value flips to a missing tag; at
/// `t+167s` the Pod reports ImagePullBackOff.
fn managed_helmrelease_fixture() -> (Arc<GraphStore>, TimestampNs) {
    let graph = Arc::new(GraphStore::new());
    let t0 = base_ts();

    // Steady state: everything healthy.
    apply_event(
        &graph,
        "hr-1",
        GroupVersionKind::new("helm.toolkit.fluxcd.io", "v2", "HelmRelease"),
        "apps",
        "web",
        "uid-hr",
        EventType::Create,
        t0,
        serde_json::json!({
            "spec": {"values": {"image": {"tag": "v1.4.2"}}},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }),
    );
    apply_event(
        &graph,
        "dep-1",
        GroupVersionKind::new("apps", "v1", "Deployment"),
        "apps",
        "web",
        "uid-dep",
        EventType::Create,
        t0 + 1_000_000_000,
        serde_json::json!({"spec": {"replicas": 2}, "status": {"readyReplicas": 2}}),
    );
    apply_event(
        &graph,
        "rs-1",
        GroupVersionKind::new("apps", "v1", "ReplicaSet"),
        "apps",
        "web-7d9f",
        "uid-rs",
        EventType::Create,
        t0 + 2_000_000_000,
        serde_json::json!({"spec": {"replicas": 2}, "status": {"readyReplicas": 2}}),
    );
    apply_event(
        &graph,
        "pod-1",
        GroupVersionKind::core("v1", "Pod"),
        "apps",
        "web-7d9f-x2v",
        "uid-pod",
        EventType::Create,
        t0 + 3_000_000_000,
        serde_json::json!({"status": {"phase": "Running"}}),
    );
    apply_event(
        &graph,
        "node-1",
        GroupVersionKind::core("v1", "Node"),
        "",
        "node-a",
        "uid-node",
        EventType::Create,
        t0,
        serde_json::json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}}),
    );
    apply_event(
        &graph,
        "sa-1",
        GroupVersionKind::core("v1", "ServiceAccount"),
        "apps",
        "web-sa",
        "uid-sa",
        EventType::Create,
        t0,
        serde_json::json!({}),
    );
    apply_event(
        &graph,
        "crb-1",
        GroupVersionKind::new("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding"),
        "",
        "web-admin",
        "uid-crb",
        EventType::Create,
        t0,
        serde_json::json!({}),
    );

    // Relationships.
    let manages = EdgeUpsert {
        from: Uid::new("uid-hr"),
        edge_type: EdgeType::Manages,
        to: Uid::new("uid-dep"),
        props: EdgeProps {
            confidence: 0.9,
            validation_state: ValidationState::Validated,
            evidence: vec![spectre_types::Evidence::new(
                "label-match",
                "helm.toolkit.fluxcd.io/name=web",
            )],
            ..EdgeProps::default()
        },
    };
    assert!(graph.upsert_edge(manages, t0 + 1_000_000_000));
    structural_edge(&graph, "uid-dep", EdgeType::Owns, "uid-rs", t0 + 2_000_000_000);
    structural_edge(&graph, "uid-rs", EdgeType::Owns, "uid-pod", t0 + 3_000_000_000);
    structural_edge(&graph, "uid-pod", EdgeType::ScheduledOn, "uid-node", t0 + 3_000_000_000);
    structural_edge(
        &graph,
        "uid-pod",
        EdgeType::UsesServiceAccount,
        "uid-sa",
        t0 + 3_000_000_000,
    );
    structural_edge(&graph, "uid-crb", EdgeType::GrantsTo, "uid-sa", t0 + 3_000_000_000);

    // The bad change: image value flips to a tag that does not exist.
    apply_event(
        &graph,
        "hr-2",
        GroupVersionKind::new("helm.toolkit.fluxcd.io", "v2", "HelmRelease"),
        "apps",
        "web",
        "uid-hr",
        EventType::Update,
        t0 + 120_000_000_000,
        serde_json::json!({
            "spec": {"values": {"image": {"tag": "v1.5.0-nonexistent"}}},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }),
    );

    // The symptom: the pod enters ImagePullBackOff 47 seconds later.
    let failure_ts = t0 + 167_000_000_000;
    apply_event(
        &graph,
        "pod-2",
        GroupVersionKind::core("v1", "Pod"),
        "apps",
        "web-7d9f-x2v",
        "uid-pod",
        EventType::Update,
        failure_ts,
        serde_json::json!({
            "status": {
                "phase": "Pending",
                "containerStatuses": [{
                    "name": "web",
                    "state": {"waiting": {
                        "reason": "ImagePullBackOff",
                        "message": "Back-off pulling image \"web:v1.5.0-nonexistent\""
                    }}
                }]
            }
        }),
    );

    (graph, failure_ts)
}

// ============================================================================
// The managed-HelmRelease scenario
// ============================================================================

#[test]
fn helmrelease_change_is_the_top_root_cause() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);

    let result = analyzer
        .root_cause(
            RootCauseQuery::new(Uid::new("uid-pod"), failure_ts),
            None,
        )
        .unwrap();

    let root = result.root_cause.expect("a root cause is found");
    assert_eq!(root.gvk.kind, "HelmRelease");
    assert_eq!(root.name, "web");

    let top = &result.paths[0];
    assert!(top.confidence >= 0.6, "confidence was {}", top.confidence);
    assert!(top.confidence <= CONFIDENCE_CAP);
    assert_eq!(top.lag_ms, 47_000);
    assert!(top.candidate.config_changed);

    // Path runs HelmRelease -> Deployment -> ReplicaSet -> Pod.
    let kinds: Vec<&str> = top.steps.iter().map(|s| s.node.gvk.kind.as_str()).collect();
    assert_eq!(kinds, ["HelmRelease", "Deployment", "ReplicaSet", "Pod"]);
    assert_eq!(top.spine_len(), 2);
}

#[test]
fn subgraph_includes_required_attachments() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);

    let result = analyzer
        .root_cause(RootCauseQuery::new(Uid::new("uid-pod"), failure_ts), None)
        .unwrap();

    let mut kinds: Vec<&str> = result
        .subgraph
        .nodes
        .iter()
        .map(|n| n.gvk.kind.as_str())
        .collect();
    kinds.sort_unstable();
    for expected in [
        "ClusterRoleBinding",
        "Deployment",
        "HelmRelease",
        "Node",
        "Pod",
        "ReplicaSet",
        "ServiceAccount",
    ] {
        assert!(kinds.contains(&expected), "missing {expected} in {kinds:?}");
    }

    let has_edge = |from_kind: &str, edge_type: EdgeType, to_kind: &str| {
        result.subgraph.edges.iter().any(|e| {
            let from = result.subgraph.nodes.iter().find(|n| n.uid == e.from);
            let to = result.subgraph.nodes.iter().find(|n| n.uid == e.to);
            e.edge_type == edge_type
                && from.is_some_and(|n| n.gvk.kind == from_kind)
                && to.is_some_and(|n| n.gvk.kind == to_kind)
        })
    };
    assert!(has_edge("HelmRelease", EdgeType::Manages, "Deployment"));
    assert!(has_edge("Deployment", EdgeType::Owns, "ReplicaSet"));
    assert!(has_edge("ReplicaSet", EdgeType::Owns, "Pod"));
    assert!(has_edge("Pod", EdgeType::ScheduledOn, "Node"));
    assert!(has_edge("Pod", EdgeType::UsesServiceAccount, "ServiceAccount"));
    assert!(has_edge("ClusterRoleBinding", EdgeType::GrantsTo, "ServiceAccount"));
}

#[test]
fn evidence_names_the_config_change() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);

    let result = analyzer
        .root_cause(RootCauseQuery::new(Uid::new("uid-pod"), failure_ts), None)
        .unwrap();

    assert!(
        result
            .evidence
            .iter()
            .any(|e| e.contains("config changed at T-47s")),
        "evidence: {:?}",
        result.evidence
    );
    assert!(
        result
            .evidence
            .iter()
            .any(|e| e.contains("helm.toolkit.fluxcd.io/name")),
        "evidence: {:?}",
        result.evidence
    );
}

// ============================================================================
// Contract properties
// ============================================================================

#[test]
fn factors_in_range_and_confidence_capped() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);
    let result = analyzer
        .root_cause(RootCauseQuery::new(Uid::new("uid-pod"), failure_ts), None)
        .unwrap();

    for path in &result.paths {
        let f = path.factors;
        for value in [
            f.direct_spec_change,
            f.temporal_proximity,
            f.relationship_strength,
            f.chain_completeness,
            f.error_match,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(path.confidence <= CONFIDENCE_CAP);
    }

    // Top ranked is the maximum confidence after tie-breaks.
    for pair in result.paths.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[test]
fn result_is_deterministic() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);
    let query = RootCauseQuery::new(Uid::new("uid-pod"), failure_ts);

    let a = analyzer.root_cause(query.clone(), None).unwrap();
    let b = analyzer.root_cause(query, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unknown_symptom_is_not_found() {
    let analyzer = Analyzer::new(Arc::new(GraphStore::new()));
    let err = analyzer
        .root_cause(
            RootCauseQuery::new(Uid::new("ghost"), base_ts()),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::SymptomNotFound { .. }));
}

#[test]
fn expired_deadline_returns_no_partial_data() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);
    let err = analyzer
        .root_cause(
            RootCauseQuery::new(Uid::new("uid-pod"), failure_ts),
            Some(Instant::now() - Duration::from_secs(1)),
        )
        .unwrap_err();
    assert!(matches!(err, AnalyzeError::DeadlineExceeded));
}

#[test]
fn max_depth_bounds_the_subgraph() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);

    // Depth 1 from the pod reaches the ReplicaSet, Node, and ServiceAccount
    // but not the Deployment or HelmRelease.
    let mut query = RootCauseQuery::new(Uid::new("uid-pod"), failure_ts);
    query.max_depth = 1;
    let result = analyzer.root_cause(query, None).unwrap();

    let kinds: Vec<&str> = result
        .subgraph
        .nodes
        .iter()
        .map(|n| n.gvk.kind.as_str())
        .collect();
    assert!(kinds.contains(&"ReplicaSet"));
    assert!(!kinds.contains(&"HelmRelease"), "depth bound ignored: {kinds:?}");
    assert!(!kinds.contains(&"Deployment"));
}

#[test]
fn quiet_nodes_become_leaves() {
    let graph = Arc::new(GraphStore::new());
    let t0 = base_ts();

    // chain: grandparent -OWNS-> parent -OWNS-> child, where the parent has
    // its only event long before the window.
    apply_event(
        &graph,
        "g-1",
        GroupVersionKind::new("apps", "v1", "Deployment"),
        "ns",
        "grand",
        "uid-grand",
        EventType::Create,
        t0,
        serde_json::json!({"spec": {}}),
    );
    apply_event(
        &graph,
        "p-1",
        GroupVersionKind::new("apps", "v1", "ReplicaSet"),
        "ns",
        "parent",
        "uid-parent",
        EventType::Create,
        t0 + 1_000_000_000,
        serde_json::json!({"spec": {}}),
    );
    apply_event(
        &graph,
        "c-1",
        GroupVersionKind::core("v1", "Pod"),
        "ns",
        "child",
        "uid-child",
        EventType::Create,
        // Hours later: only the child has events near the failure.
        t0 + 7_200_000_000_000,
        serde_json::json!({"status": {"phase": "Running"}}),
    );
    structural_edge(&graph, "uid-grand", EdgeType::Owns, "uid-parent", t0);
    structural_edge(&graph, "uid-parent", EdgeType::Owns, "uid-child", t0);

    let analyzer = Analyzer::new(graph);
    // Default 30-minute lookback: the parent's event is outside the window,
    // so the parent is kept as a leaf and the grandparent never enters.
    let result = analyzer
        .root_cause(
            RootCauseQuery::new(Uid::new("uid-child"), t0 + 7_200_000_000_000),
            None,
        )
        .unwrap();

    let kinds: Vec<&str> = result
        .subgraph
        .nodes
        .iter()
        .map(|n| n.gvk.kind.as_str())
        .collect();
    assert!(kinds.contains(&"ReplicaSet"), "leaf itself is kept");
    assert!(
        !kinds.contains(&"Deployment"),
        "expansion stopped at the quiet leaf: {kinds:?}"
    );
}

#[test]
fn status_only_churn_does_not_keep_expanding() {
    let graph = Arc::new(GraphStore::new());
    let t0 = base_ts();
    let failure_ts = t0 + 7_200_000_000_000;

    // grandparent -OWNS-> parent -OWNS-> child. The parent's config change
    // is hours old; inside the window it only reports status churn.
    apply_event(
        &graph,
        "g-1",
        GroupVersionKind::new("apps", "v1", "Deployment"),
        "ns",
        "grand",
        "uid-grand",
        EventType::Create,
        t0,
        serde_json::json!({"spec": {"replicas": 2}}),
    );
    apply_event(
        &graph,
        "p-1",
        GroupVersionKind::new("apps", "v1", "ReplicaSet"),
        "ns",
        "parent",
        "uid-parent",
        EventType::Create,
        t0 + 1_000_000_000,
        serde_json::json!({"spec": {"replicas": 2}, "status": {"readyReplicas": 2}}),
    );
    apply_event(
        &graph,
        "p-2",
        GroupVersionKind::new("apps", "v1", "ReplicaSet"),
        "ns",
        "parent",
        "uid-parent",
        EventType::Update,
        failure_ts - 60_000_000_000,
        serde_json::json!({"spec": {"replicas": 2}, "status": {"readyReplicas": 1}}),
    );
    apply_event(
        &graph,
        "c-1",
        GroupVersionKind::core("v1", "Pod"),
        "ns",
        "child",
        "uid-child",
        EventType::Create,
        failure_ts - 30_000_000_000,
        serde_json::json!({"status": {"phase": "Running"}}),
    );
    structural_edge(&graph, "uid-grand", EdgeType::Owns, "uid-parent", t0);
    structural_edge(&graph, "uid-parent", EdgeType::Owns, "uid-child", t0);

    let analyzer = Analyzer::new(Arc::clone(&graph));
    let result = analyzer
        .root_cause(RootCauseQuery::new(Uid::new("uid-child"), failure_ts), None)
        .unwrap();

    // The parent's in-window event is status-only, so the parent is a leaf:
    // kept, not expanded, and the grandparent never enters the subgraph.
    let parent_event = graph
        .get_change_event(&spectre_types::EventId::new("p-2"))
        .unwrap();
    assert!(!parent_event.config_changed);
    assert!(parent_event.status_changed);

    let kinds: Vec<&str> = result
        .subgraph
        .nodes
        .iter()
        .map(|n| n.gvk.kind.as_str())
        .collect();
    assert!(kinds.contains(&"ReplicaSet"));
    assert!(
        !kinds.contains(&"Deployment"),
        "status-only churn kept the node expanding: {kinds:?}"
    );
}

#[test]
fn min_confidence_filters_weak_candidates() {
    let (graph, failure_ts) = managed_helmrelease_fixture();
    let analyzer = Analyzer::new(graph);

    let mut query = RootCauseQuery::new(Uid::new("uid-pod"), failure_ts);
    query.min_confidence = 0.99; // above the cap: nothing can pass
    let result = analyzer.root_cause(query, None).unwrap();
    assert!(result.paths.is_empty());
    assert!(result.root_cause.is_none());
}
