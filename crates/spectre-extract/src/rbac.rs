//! RBAC extractor: role bindings to their subjects.

use serde_json::Value;
use spectre_graph::{EdgeProps, EdgeUpsert};
use spectre_types::{EdgeType, Event, ValidationState};

use crate::{Extractor, GraphLookup};

pub const EXTRACTOR: Extractor = Extractor {
    name: "rbac",
    priority: 40,
    matches,
    extract,
};

fn matches(event: &Event) -> bool {
    matches!(
        event.resource.gvk.kind.as_str(),
        "RoleBinding" | "ClusterRoleBinding"
    )
}

/// GRANTS_TO edges from a (Cluster)RoleBinding to each subject.
///
/// Only subjects that exist as identity nodes resolve — in practice
/// ServiceAccounts, since Users and Groups have no cluster objects to watch.
/// The `subject_kind` property records what the binding names either way.
fn extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    let Some(subjects) = doc.get("subjects").and_then(Value::as_array) else {
        return Vec::new();
    };

    let binding_namespace = event.resource.namespace.as_str();
    let mut edges = Vec::new();

    for subject in subjects {
        let Some(kind) = subject.get("kind").and_then(Value::as_str) else {
            continue;
        };
        let Some(name) = subject.get("name").and_then(Value::as_str) else {
            continue;
        };
        // Subjects may carry their own namespace (ServiceAccounts always do
        // in ClusterRoleBindings); fall back to the binding's.
        let namespace = subject
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(binding_namespace);

        let target = match kind {
            "ServiceAccount" => lookup.find_resource_by_namespace(namespace, kind, name),
            // Users and Groups are not cluster objects; nothing to resolve.
            _ => None,
        };

        if let Some(target) = target {
            edges.push(EdgeUpsert {
                from: event.resource.uid.clone(),
                edge_type: EdgeType::GrantsTo,
                to: target.uid,
                props: EdgeProps {
                    confidence: 1.0,
                    validation_state: ValidationState::Validated,
                    subject_kind: Some(kind.to_string()),
                    ..EdgeProps::default()
                },
            });
        }
    }

    edges
}
