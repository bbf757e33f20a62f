//! PodSpec extractor: placement, identity, and spec references of a Pod.

use serde_json::Value;
use spectre_graph::{EdgeProps, EdgeUpsert};
use spectre_types::{EdgeType, Event, Uid, ValidationState};

use crate::{Extractor, GraphLookup};

pub const EXTRACTOR: Extractor = Extractor {
    name: "pod-spec",
    priority: 20,
    matches,
    extract,
};

fn matches(event: &Event) -> bool {
    event.resource.gvk.kind == "Pod"
}

fn extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    let namespace = event.resource.namespace.as_str();
    let pod_uid = &event.resource.uid;
    let mut edges = Vec::new();

    // SCHEDULED_ON: Pod -> Node, by name (nodes are cluster-scoped).
    if let Some(node_name) = doc.pointer("/spec/nodeName").and_then(Value::as_str) {
        if let Some(node) = lookup.find_resource_by_namespace("", "Node", node_name) {
            edges.push(EdgeUpsert::structural(
                pod_uid.clone(),
                EdgeType::ScheduledOn,
                node.uid,
            ));
        }
    }

    // USES_SERVICE_ACCOUNT: Pod -> ServiceAccount in the pod's namespace.
    let sa_name = doc
        .pointer("/spec/serviceAccountName")
        .and_then(Value::as_str)
        .unwrap_or("default");
    if let Some(sa) = lookup.find_resource_by_namespace(namespace, "ServiceAccount", sa_name) {
        edges.push(EdgeUpsert::structural(
            pod_uid.clone(),
            EdgeType::UsesServiceAccount,
            sa.uid,
        ));
    }

    // REFERENCES_SPEC: env and volume references to ConfigMap/Secret/PVC.
    for reference in spec_references(&doc) {
        if let Some(target) =
            lookup.find_resource_by_namespace(namespace, &reference.kind, &reference.name)
        {
            edges.push(EdgeUpsert {
                from: pod_uid.clone(),
                edge_type: EdgeType::ReferencesSpec,
                to: target.uid,
                props: EdgeProps {
                    confidence: 1.0,
                    validation_state: ValidationState::Validated,
                    ref_kind: Some(reference.kind),
                    field_path: Some(reference.field_path),
                    ..EdgeProps::default()
                },
            });
        }
    }

    edges
}

struct SpecReference {
    kind: String,
    name: String,
    field_path: String,
}

/// Walks containers and volumes for ConfigMap/Secret/PVC references.
fn spec_references(doc: &Value) -> Vec<SpecReference> {
    let mut refs = Vec::new();

    for containers_path in ["/spec/containers", "/spec/initContainers"] {
        let Some(containers) = doc.pointer(containers_path).and_then(Value::as_array) else {
            continue;
        };
        for (ci, container) in containers.iter().enumerate() {
            if let Some(env) = container.get("env").and_then(Value::as_array) {
                for (ei, entry) in env.iter().enumerate() {
                    let base = format!("{containers_path}/{ci}/env/{ei}/valueFrom");
                    if let Some(name) = entry
                        .pointer("/valueFrom/configMapKeyRef/name")
                        .and_then(Value::as_str)
                    {
                        refs.push(SpecReference {
                            kind: "ConfigMap".into(),
                            name: name.into(),
                            field_path: format!("{base}/configMapKeyRef"),
                        });
                    }
                    if let Some(name) = entry
                        .pointer("/valueFrom/secretKeyRef/name")
                        .and_then(Value::as_str)
                    {
                        refs.push(SpecReference {
                            kind: "Secret".into(),
                            name: name.into(),
                            field_path: format!("{base}/secretKeyRef"),
                        });
                    }
                }
            }
            if let Some(env_from) = container.get("envFrom").and_then(Value::as_array) {
                for (ei, entry) in env_from.iter().enumerate() {
                    let base = format!("{containers_path}/{ci}/envFrom/{ei}");
                    if let Some(name) =
                        entry.pointer("/configMapRef/name").and_then(Value::as_str)
                    {
                        refs.push(SpecReference {
                            kind: "ConfigMap".into(),
                            name: name.into(),
                            field_path: format!("{base}/configMapRef"),
                        });
                    }
                    if let Some(name) = entry.pointer("/secretRef/name").and_then(Value::as_str) {
                        refs.push(SpecReference {
                            kind: "Secret".into(),
                            name: name.into(),
                            field_path: format!("{base}/secretRef"),
                        });
                    }
                }
            }
        }
    }

    if let Some(volumes) = doc.pointer("/spec/volumes").and_then(Value::as_array) {
        for (vi, volume) in volumes.iter().enumerate() {
            let base = format!("/spec/volumes/{vi}");
            if let Some(name) = volume.pointer("/configMap/name").and_then(Value::as_str) {
                refs.push(SpecReference {
                    kind: "ConfigMap".into(),
                    name: name.into(),
                    field_path: format!("{base}/configMap"),
                });
            }
            if let Some(name) = volume.pointer("/secret/secretName").and_then(Value::as_str) {
                refs.push(SpecReference {
                    kind: "Secret".into(),
                    name: name.into(),
                    field_path: format!("{base}/secret"),
                });
            }
            if let Some(name) = volume
                .pointer("/persistentVolumeClaim/claimName")
                .and_then(Value::as_str)
            {
                refs.push(SpecReference {
                    kind: "PersistentVolumeClaim".into(),
                    name: name.into(),
                    field_path: format!("{base}/persistentVolumeClaim"),
                });
            }
        }
    }

    refs
}
