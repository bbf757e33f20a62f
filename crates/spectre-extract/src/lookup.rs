//! Read-only graph view handed to extractors.

use spectre_graph::{ChangeEventNode, GraphStore, Pattern, PatternMatch, ResourceIdentityNode};
use spectre_types::{TimestampNs, Uid};

/// The lookup interface extractors receive.
///
/// Strictly read-only; extractors cannot mutate the graph through it. The
/// indexer passes the live store, tests pass fixtures.
pub trait GraphLookup {
    fn find_resource_by_uid(&self, uid: &Uid) -> Option<ResourceIdentityNode>;

    fn find_resource_by_namespace(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Option<ResourceIdentityNode>;

    fn find_recent_events(&self, uid: &Uid, since: TimestampNs) -> Vec<ChangeEventNode>;

    fn query_graph(&self, pattern: &Pattern) -> Vec<PatternMatch>;
}

impl GraphLookup for GraphStore {
    fn find_resource_by_uid(&self, uid: &Uid) -> Option<ResourceIdentityNode> {
        GraphStore::find_resource_by_uid(self, uid)
    }

    fn find_resource_by_namespace(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Option<ResourceIdentityNode> {
        GraphStore::find_resource_by_namespace(self, namespace, kind, name)
    }

    fn find_recent_events(&self, uid: &Uid, since: TimestampNs) -> Vec<ChangeEventNode> {
        GraphStore::find_recent_events(self, uid, since)
    }

    fn query_graph(&self, pattern: &Pattern) -> Vec<PatternMatch> {
        GraphStore::query(self, pattern)
    }
}
