//! OwnerReferences extractor: the standard Kubernetes ownership chain.

use serde_json::Value;
use spectre_graph::EdgeUpsert;
use spectre_types::{EdgeType, Event, Uid};

use crate::{Extractor, GraphLookup};

pub const EXTRACTOR: Extractor = Extractor {
    name: "owner-references",
    priority: 10,
    matches,
    extract,
};

fn matches(event: &Event) -> bool {
    // Cheap pre-filter; the JSON walk below handles absence anyway.
    !event.data.is_empty()
}

/// Emits `OWNS` from each owner reference to the child.
///
/// Controller references are preferred: when any reference carries
/// `controller: true`, only those produce edges. Resources without a
/// controller (e.g. shared ConfigMaps with plain owners) fall back to all
/// references. Owners not yet observed are skipped by the store's
/// endpoint check.
fn extract(event: &Event, _lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(doc) = event.data_json() else {
        return Vec::new();
    };
    let Some(refs) = doc
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let has_controller = refs
        .iter()
        .any(|r| r.get("controller").and_then(Value::as_bool) == Some(true));

    refs.iter()
        .filter(|r| {
            !has_controller || r.get("controller").and_then(Value::as_bool) == Some(true)
        })
        .filter_map(|r| r.get("uid").and_then(Value::as_str))
        .map(|owner_uid| {
            EdgeUpsert::structural(
                Uid::new(owner_uid),
                EdgeType::Owns,
                event.resource.uid.clone(),
            )
        })
        .collect()
}
