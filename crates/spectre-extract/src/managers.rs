//! Manager extractors: declarative MANAGES edges inferred from GitOps
//! labels combined with temporal co-appearance.
//!
//! Unlike owner references, nothing in the API ties a Flux Kustomization or
//! an ArgoCD Application to the resources it produced. The controllers do
//! leave well-known labels on their children, and the child appears shortly
//! after the manager's config changes. Both signals combine into a
//! confidence score; the edge starts `tentative` and is promoted when a
//! later event reinforces it.

use serde_json::Value;
use spectre_graph::{ChangeEventNode, EdgeProps, EdgeUpsert, NodePattern, Pattern};
use spectre_types::{EdgeType, Event, Evidence, TimestampNs, Uid, ValidationState};

use crate::{Extractor, GraphLookup};

/// Window within which a child's appearance counts as temporally close to a
/// manager's config change.
const PROXIMITY_WINDOW_MS: i64 = 600_000;

/// Factor weights: label match, destination namespace, temporal proximity.
const WEIGHT_LABEL: f64 = 0.5;
const WEIGHT_NAMESPACE: f64 = 0.2;
const WEIGHT_PROXIMITY: f64 = 0.3;

pub const FLUX_EXTRACTOR: Extractor = Extractor {
    name: "flux-manager",
    priority: 50,
    matches: flux_matches,
    extract: flux_extract,
};

pub const ARGO_EXTRACTOR: Extractor = Extractor {
    name: "argo-manager",
    priority: 51,
    matches: argo_matches,
    extract: argo_extract,
};

// ============================================================================
// Flux (Kustomization / HelmRelease)
// ============================================================================

const FLUX_LABEL_SETS: &[(&str, &str, &str)] = &[
    (
        "kustomize.toolkit.fluxcd.io/name",
        "kustomize.toolkit.fluxcd.io/namespace",
        "Kustomization",
    ),
    (
        "helm.toolkit.fluxcd.io/name",
        "helm.toolkit.fluxcd.io/namespace",
        "HelmRelease",
    ),
];

fn flux_matches(event: &Event) -> bool {
    !event.data.is_empty() && event.resource.gvk.kind != "Event"
}

fn flux_extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    let mut edges = Vec::new();

    for (name_label, namespace_label, manager_kind) in FLUX_LABEL_SETS {
        let Some(manager_name) = label(&doc, name_label) else {
            continue;
        };
        // Without the namespace label, assume the manager lives alongside
        // its child (Flux's default for unqualified references).
        let manager_namespace =
            label(&doc, namespace_label).unwrap_or_else(|| event.resource.namespace.clone());

        let Some(manager) =
            lookup.find_resource_by_namespace(&manager_namespace, manager_kind, &manager_name)
        else {
            continue;
        };

        let mut evidence = vec![Evidence::new(
            "label-match",
            format!("{name_label}={manager_name}"),
        )];
        let label_strength = if label(&doc, namespace_label).is_some() {
            1.0
        } else {
            0.8
        };

        let confidence = manager_confidence(
            event,
            lookup,
            &manager.uid,
            &manager_namespace,
            label_strength,
            &mut evidence,
        );

        edges.push(EdgeUpsert {
            from: manager.uid,
            edge_type: EdgeType::Manages,
            to: event.resource.uid.clone(),
            props: EdgeProps {
                confidence,
                validation_state: ValidationState::Tentative,
                evidence,
                ..EdgeProps::default()
            },
        });
    }

    edges
}

// ============================================================================
// ArgoCD (Application)
// ============================================================================

const ARGO_INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

fn argo_matches(event: &Event) -> bool {
    !event.data.is_empty()
        && event.resource.gvk.kind != "Event"
        && event.resource.gvk.kind != "Application"
}

fn argo_extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    let Some(app_name) = label(&doc, ARGO_INSTANCE_LABEL) else {
        return Vec::new();
    };

    // Applications live in the argocd namespace (or wherever the operator
    // put them); search by kind + name across namespaces.
    let mut candidates = lookup.query_graph(&Pattern::node(NodePattern {
        kind: Some("Application".into()),
        name: Some(app_name.clone()),
        ..NodePattern::default()
    }));
    let Some(app) = candidates.pop().map(|m| m.node) else {
        return Vec::new();
    };

    let mut evidence = vec![Evidence::new(
        "label-match",
        format!("{ARGO_INSTANCE_LABEL}={app_name}"),
    )];
    // The instance label is a convention shared with plain Helm installs, so
    // it is weaker evidence than Flux's fully-qualified labels.
    let confidence = manager_confidence(
        event,
        lookup,
        &app.uid,
        destination_namespace(&app, lookup).as_deref().unwrap_or(""),
        0.7,
        &mut evidence,
    );

    vec![EdgeUpsert {
        from: app.uid,
        edge_type: EdgeType::Manages,
        to: event.resource.uid.clone(),
        props: EdgeProps {
            confidence,
            validation_state: ValidationState::Tentative,
            evidence,
            ..EdgeProps::default()
        },
    }]
}

/// The Application's `spec.destination.namespace`, read from its most
/// recent change event.
fn destination_namespace(
    app: &spectre_graph::ResourceIdentityNode,
    lookup: &dyn GraphLookup,
) -> Option<String> {
    let events = lookup.find_recent_events(&app.uid, TimestampNs::ZERO);
    events
        .last()
        .and_then(ChangeEventNode::data_json)
        .and_then(|doc| {
            doc.pointer("/spec/destination/namespace")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

// ============================================================================
// Shared scoring
// ============================================================================

/// Weighted combination of label strength, destination-namespace match, and
/// temporal proximity between the child's appearance and the manager's most
/// recent config change.
fn manager_confidence(
    event: &Event,
    lookup: &dyn GraphLookup,
    manager_uid: &Uid,
    manager_namespace: &str,
    label_strength: f64,
    evidence: &mut Vec<Evidence>,
) -> f64 {
    let mut confidence = WEIGHT_LABEL * label_strength;

    if !manager_namespace.is_empty() && manager_namespace == event.resource.namespace {
        confidence += WEIGHT_NAMESPACE;
        evidence.push(Evidence::new(
            "destination-namespace",
            event.resource.namespace.clone(),
        ));
    }

    let child_appeared = lookup
        .find_resource_by_uid(&event.resource.uid)
        .map_or(event.timestamp, |node| node.first_seen);
    let window_start = child_appeared - PROXIMITY_WINDOW_MS * 1_000_000;
    let last_config_change = lookup
        .find_recent_events(manager_uid, window_start)
        .into_iter()
        .filter(|e| e.config_changed && e.timestamp <= child_appeared)
        .map(|e| e.timestamp)
        .max();

    if let Some(changed_at) = last_config_change {
        let lag_ms = child_appeared.lag_ms_since(changed_at);
        let proximity = (1.0 - lag_ms as f64 / PROXIMITY_WINDOW_MS as f64).max(0.0);
        confidence += WEIGHT_PROXIMITY * proximity;
        evidence.push(Evidence::new(
            "temporal-proximity",
            format!("appeared {lag_ms}ms after manager config change"),
        ));
    }

    confidence.clamp(0.0, 1.0)
}

fn label(doc: &Value, name: &str) -> Option<String> {
    doc.pointer("/metadata/labels")
        .and_then(Value::as_object)
        .and_then(|labels| labels.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
}
