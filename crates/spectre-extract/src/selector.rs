//! Selector extractor: label-selector matches and Ingress backends.

use std::collections::BTreeMap;

use serde_json::Value;
use spectre_graph::{EdgeProps, EdgeUpsert, NodePattern, Pattern};
use spectre_types::{EdgeType, Event, ValidationState};

use crate::{Extractor, GraphLookup};

pub const EXTRACTOR: Extractor = Extractor {
    name: "selector",
    priority: 30,
    matches,
    extract,
};

fn matches(event: &Event) -> bool {
    matches!(
        event.resource.gvk.kind.as_str(),
        "Service" | "NetworkPolicy" | "Ingress"
    )
}

fn extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    match event.resource.gvk.kind.as_str() {
        "Service" => select_pods(event, lookup, selector_map(doc.pointer("/spec/selector"))),
        // NetworkPolicy selectors never cross namespaces; the pod query below
        // is always pinned to the policy's own namespace, which enforces it.
        "NetworkPolicy" => select_pods(
            event,
            lookup,
            selector_map(doc.pointer("/spec/podSelector/matchLabels")),
        ),
        "Ingress" => ingress_backends(event, lookup, &doc),
        _ => Vec::new(),
    }
}

fn selector_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// SELECTS edges to every pod in the selector's namespace whose labels
/// satisfy the selector. An empty selector selects nothing (a Service
/// without a selector is backed by manual Endpoints).
fn select_pods(
    event: &Event,
    lookup: &dyn GraphLookup,
    selector: BTreeMap<String, String>,
) -> Vec<EdgeUpsert> {
    if selector.is_empty() {
        return Vec::new();
    }

    let mut pattern = NodePattern::kind("Pod").in_namespace(event.resource.namespace.clone());
    pattern.labels = selector;
    pattern.deleted = Some(false);

    lookup
        .query_graph(&Pattern::node(pattern))
        .into_iter()
        .map(|m| {
            EdgeUpsert::structural(event.resource.uid.clone(), EdgeType::Selects, m.node.uid)
        })
        .collect()
}

/// REFERENCES_SPEC edges from an Ingress to its backend Services.
fn ingress_backends(event: &Event, lookup: &dyn GraphLookup, doc: &Value) -> Vec<EdgeUpsert> {
    let mut edges = Vec::new();
    let namespace = event.resource.namespace.as_str();

    let mut push_backend = |name: &str, field_path: String| {
        if let Some(service) = lookup.find_resource_by_namespace(namespace, "Service", name) {
            edges.push(EdgeUpsert {
                from: event.resource.uid.clone(),
                edge_type: EdgeType::ReferencesSpec,
                to: service.uid,
                props: EdgeProps {
                    confidence: 1.0,
                    validation_state: ValidationState::Validated,
                    ref_kind: Some("Service".into()),
                    field_path: Some(field_path),
                    ..EdgeProps::default()
                },
            });
        }
    };

    if let Some(name) = doc
        .pointer("/spec/defaultBackend/service/name")
        .and_then(Value::as_str)
    {
        push_backend(name, "/spec/defaultBackend/service".to_string());
    }

    if let Some(rules) = doc.pointer("/spec/rules").and_then(Value::as_array) {
        for (ri, rule) in rules.iter().enumerate() {
            let Some(paths) = rule.pointer("/http/paths").and_then(Value::as_array) else {
                continue;
            };
            for (pi, path) in paths.iter().enumerate() {
                if let Some(name) = path
                    .pointer("/backend/service/name")
                    .and_then(Value::as_str)
                {
                    push_backend(
                        name,
                        format!("/spec/rules/{ri}/http/paths/{pi}/backend/service"),
                    );
                }
            }
        }
    }

    edges
}
