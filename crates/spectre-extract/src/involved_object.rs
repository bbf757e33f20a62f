//! Involved-object extractor: links Kubernetes Event resources to the
//! object they report on.

use spectre_graph::{EdgeProps, EdgeUpsert};
use spectre_types::{EdgeType, Event, ValidationState};

use crate::{Extractor, GraphLookup};

pub const EXTRACTOR: Extractor = Extractor {
    name: "involved-object",
    priority: 60,
    matches,
    extract,
};

fn matches(event: &Event) -> bool {
    event.resource.gvk.kind == "Event" && event.resource.involved_object_uid.is_some()
}

fn extract(event: &Event, lookup: &dyn GraphLookup) -> Vec<EdgeUpsert> {
    let Some(involved_uid) = event.resource.involved_object_uid.clone() else {
        return Vec::new();
    };
    // Only link when the involved object has been observed.
    let Some(target) = lookup.find_resource_by_uid(&involved_uid) else {
        return Vec::new();
    };

    vec![EdgeUpsert {
        from: event.resource.uid.clone(),
        edge_type: EdgeType::ReferencesSpec,
        to: target.uid,
        props: EdgeProps {
            confidence: 1.0,
            validation_state: ValidationState::Validated,
            ref_kind: Some(target.gvk.kind.clone()),
            field_path: Some("/involvedObject".to_string()),
            ..EdgeProps::default()
        },
    }]
}
