//! The property graph store.
//!
//! In-memory maps behind one `RwLock`. The external contract is single
//! writer (the indexer), many readers: queries clone the data they return
//! and never hold references into the store.
//!
//! # Consistency
//!
//! Writes for one event are several calls (identity upsert, change event,
//! edge upserts); each call is individually atomic with respect to readers.
//! Readers that need fully-applied state cut off at the indexer watermark.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use spectre_types::{EdgeType, Event, EventId, EventType, TimestampNs, Uid};

use crate::diff::{derive_flags, impact_score};
use crate::edge::{EdgeKey, EdgeRecord, EdgeUpsert, TriggeredByRecord};
use crate::node::{ChangeEventNode, ResourceIdentityNode};
use crate::pattern::{Direction, Pattern, PatternMatch};
use crate::status_rules::{container_issues, derive_status};

/// Which node family a retention sweep targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Change events older than the cutoff.
    ChangeEvents,
    /// Resource identities not seen since the cutoff; cascades to their
    /// change events (explicit purge).
    ResourceIdentities,
}

/// Counts from a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub identities_removed: usize,
    pub events_removed: usize,
    pub edges_removed: usize,
}

#[derive(Debug, Default)]
struct GraphInner {
    identities: HashMap<Uid, ResourceIdentityNode>,
    events: HashMap<EventId, ChangeEventNode>,
    /// Per-uid event ids in ingest order.
    events_by_uid: HashMap<Uid, Vec<EventId>>,
    edges: BTreeMap<EdgeKey, EdgeRecord>,
    /// Reverse adjacency: target uid -> keys of edges pointing at it.
    edges_to: HashMap<Uid, Vec<EdgeKey>>,
    triggered_by: Vec<TriggeredByRecord>,
    /// Maximum change-event timestamp ever recorded.
    watermark: TimestampNs,
}

/// The graph store (component C5).
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<GraphInner>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Writes (single writer: the indexer)
    // ========================================================================

    /// Creates or updates the identity node for the event's resource.
    ///
    /// Maintains `first_seen`/`last_seen`, refreshes labels from the
    /// document, and handles the deletion lifecycle: DELETE marks the node
    /// deleted, and a later same-uid CREATE reopens it.
    pub fn upsert_resource_identity(&self, event: &Event) {
        let meta = &event.resource;
        let labels = event.data_json().and_then(|doc| {
            doc.pointer("/metadata/labels").and_then(|l| {
                l.as_object().map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect::<BTreeMap<_, _>>()
                })
            })
        });

        let mut inner = self.write();
        let node = inner
            .identities
            .entry(meta.uid.clone())
            .or_insert_with(|| ResourceIdentityNode {
                uid: meta.uid.clone(),
                gvk: meta.gvk.clone(),
                namespace: meta.namespace.clone(),
                name: meta.name.clone(),
                first_seen: event.timestamp,
                last_seen: event.timestamp,
                deleted: false,
                deleted_at: None,
                labels: BTreeMap::new(),
            });

        node.first_seen = node.first_seen.min(event.timestamp);
        node.last_seen = node.last_seen.max(event.timestamp);
        node.name = meta.name.clone();
        node.namespace = meta.namespace.clone();
        if let Some(labels) = labels {
            node.labels = labels;
        }

        match event.event_type {
            EventType::Delete => {
                node.deleted = true;
                node.deleted_at = Some(event.timestamp);
            }
            EventType::Create if node.deleted => {
                // Same-uid recreation: reopen rather than forking a new
                // identity, keeping pre-delete history attached.
                node.deleted = false;
                node.deleted_at = None;
            }
            _ => {}
        }
    }

    /// Records the change-event node for an accepted event, deriving status,
    /// change flags, and container issues against the previous document of
    /// the same uid.
    pub fn record_change_event(&self, event: &Event) -> ChangeEventNode {
        let doc = event.data_json();
        let mut inner = self.write();

        let prior_doc = inner
            .events_by_uid
            .get(&event.resource.uid)
            .and_then(|ids| ids.last())
            .and_then(|id| inner.events.get(id))
            .and_then(ChangeEventNode::data_json);

        let flags = derive_flags(prior_doc.as_ref(), doc.as_ref());
        let outcome = derive_status(event.resource.kind(), event.event_type, doc.as_ref());
        let issues = doc.as_ref().map(container_issues).unwrap_or_default();

        let node = ChangeEventNode {
            id: event.id.clone(),
            uid: event.resource.uid.clone(),
            timestamp: event.timestamp,
            event_type: event.event_type,
            status: outcome.status,
            error_message: outcome.error_message,
            impact_score: impact_score(flags, outcome.status, &issues),
            config_changed: flags.config_changed,
            status_changed: flags.status_changed,
            replicas_changed: flags.replicas_changed,
            container_issues: issues,
            data: event.data.clone(),
        };

        inner.watermark = inner.watermark.max(event.timestamp);
        // Re-recording an id (import overwrite) replaces the node in place;
        // the per-uid ordering keeps a single entry.
        if !inner.events.contains_key(&event.id) {
            inner
                .events_by_uid
                .entry(event.resource.uid.clone())
                .or_default()
                .push(event.id.clone());
        }
        inner.events.insert(event.id.clone(), node.clone());
        node
    }

    /// Applies an extractor edge with the dedup rule: insert if absent,
    /// otherwise advance `last_validated`, merge evidence, keep the maximum
    /// confidence.
    ///
    /// Returns `false` when either endpoint is unknown; the edge is dropped
    /// silently (logged at debug), per the error taxonomy.
    pub fn upsert_edge(&self, upsert: EdgeUpsert, observed_at: TimestampNs) -> bool {
        let mut inner = self.write();
        if !inner.identities.contains_key(&upsert.from)
            || !inner.identities.contains_key(&upsert.to)
        {
            tracing::debug!(
                from = %upsert.from,
                to = %upsert.to,
                edge_type = %upsert.edge_type,
                "dropping edge with unknown endpoint"
            );
            return false;
        }

        let key = EdgeKey {
            from: upsert.from,
            edge_type: upsert.edge_type,
            to: upsert.to,
        };
        match inner.edges.get_mut(&key) {
            Some(existing) => existing.reinforce(upsert.props, observed_at),
            None => {
                let record = EdgeRecord::new(key.clone(), upsert.props, observed_at);
                inner
                    .edges_to
                    .entry(key.to.clone())
                    .or_default()
                    .push(key.clone());
                inner.edges.insert(key, record);
            }
        }
        true
    }

    /// Stores a TRIGGERED_BY causal link. Keyed by `(from_event, to_event)`
    /// but repeat inferences accumulate; there is no cross-time dedup.
    pub fn add_triggered_by(&self, record: TriggeredByRecord) {
        self.write().triggered_by.push(record);
    }

    /// Retention sweep: drops nodes older than `cutoff`.
    pub fn delete_by_timestamp(&self, node_kind: NodeKind, cutoff: TimestampNs) -> SweepStats {
        let mut inner = self.write();
        let mut stats = SweepStats::default();

        match node_kind {
            NodeKind::ChangeEvents => {
                let stale: Vec<EventId> = inner
                    .events
                    .iter()
                    .filter(|(_, node)| node.timestamp < cutoff)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &stale {
                    if let Some(node) = inner.events.remove(id) {
                        stats.events_removed += 1;
                        if let Some(ids) = inner.events_by_uid.get_mut(&node.uid) {
                            ids.retain(|i| i != id);
                        }
                    }
                }
                let GraphInner {
                    events,
                    triggered_by,
                    ..
                } = &mut *inner;
                triggered_by.retain(|t| {
                    events.contains_key(&t.from_event) && events.contains_key(&t.to_event)
                });
            }
            NodeKind::ResourceIdentities => {
                let stale: Vec<Uid> = inner
                    .identities
                    .iter()
                    .filter(|(_, node)| node.last_seen < cutoff)
                    .map(|(uid, _)| uid.clone())
                    .collect();
                for uid in &stale {
                    inner.identities.remove(uid);
                    stats.identities_removed += 1;

                    // Explicit purge cascades to the identity's events.
                    if let Some(ids) = inner.events_by_uid.remove(uid) {
                        for id in ids {
                            if inner.events.remove(&id).is_some() {
                                stats.events_removed += 1;
                            }
                        }
                    }

                    // And to every edge touching the identity.
                    let stale_keys: Vec<EdgeKey> = inner
                        .edges
                        .keys()
                        .filter(|k| &k.from == uid || &k.to == uid)
                        .cloned()
                        .collect();
                    for key in stale_keys {
                        inner.edges.remove(&key);
                        if let Some(rev) = inner.edges_to.get_mut(&key.to) {
                            rev.retain(|k| k != &key);
                        }
                        stats.edges_removed += 1;
                    }
                    inner.edges_to.remove(uid);
                }
                let GraphInner {
                    events,
                    triggered_by,
                    ..
                } = &mut *inner;
                triggered_by.retain(|t| {
                    events.contains_key(&t.from_event) && events.contains_key(&t.to_event)
                });
            }
        }

        if stats != SweepStats::default() {
            tracing::info!(
                identities = stats.identities_removed,
                events = stats.events_removed,
                edges = stats.edges_removed,
                cutoff = %cutoff,
                "retention sweep complete"
            );
        }
        stats
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The graph watermark: maximum change-event timestamp ever recorded.
    pub fn graph_watermark(&self) -> TimestampNs {
        self.read().watermark
    }

    pub fn find_resource_by_uid(&self, uid: &Uid) -> Option<ResourceIdentityNode> {
        self.read().identities.get(uid).cloned()
    }

    /// Secondary lookup by `(namespace, kind, name)` for cross-references
    /// made by name. Prefers a live node over a deleted one.
    pub fn find_resource_by_namespace(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Option<ResourceIdentityNode> {
        let inner = self.read();
        let mut deleted_match = None;
        for node in inner.identities.values() {
            if node.namespace == namespace && node.gvk.kind == kind && node.name == name {
                if !node.deleted {
                    return Some(node.clone());
                }
                deleted_match = Some(node.clone());
            }
        }
        deleted_match
    }

    /// Change events of a uid with `timestamp >= since`, in ingest order.
    pub fn find_recent_events(&self, uid: &Uid, since: TimestampNs) -> Vec<ChangeEventNode> {
        let inner = self.read();
        inner
            .events_by_uid
            .get(uid)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.events.get(id))
                    .filter(|node| node.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Change events of a uid within `[start, end]`, ingest order, capped at
    /// `limit` most recent when given.
    pub fn events_for_uid(
        &self,
        uid: &Uid,
        start: TimestampNs,
        end: TimestampNs,
        limit: Option<usize>,
    ) -> Vec<ChangeEventNode> {
        let inner = self.read();
        let mut events: Vec<ChangeEventNode> = inner
            .events_by_uid
            .get(uid)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.events.get(id))
                    .filter(|node| node.timestamp.in_range(start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = limit {
            if events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        events
    }

    pub fn get_change_event(&self, id: &EventId) -> Option<ChangeEventNode> {
        self.read().events.get(id).cloned()
    }

    /// Outgoing edges of a node.
    pub fn edges_from(&self, uid: &Uid) -> Vec<EdgeRecord> {
        let inner = self.read();
        let lower = EdgeKey {
            from: uid.clone(),
            edge_type: EdgeType::ALL[0],
            to: Uid::default(),
        };
        inner
            .edges
            .range(lower..)
            .take_while(|(k, _)| &k.from == uid)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Incoming edges of a node.
    pub fn edges_to(&self, uid: &Uid) -> Vec<EdgeRecord> {
        let inner = self.read();
        inner
            .edges_to
            .get(uid)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| inner.edges.get(k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_edge(&self, from: &Uid, edge_type: EdgeType, to: &Uid) -> Option<EdgeRecord> {
        self.read()
            .edges
            .get(&EdgeKey {
                from: from.clone(),
                edge_type,
                to: to.clone(),
            })
            .cloned()
    }

    pub fn triggered_by(&self) -> Vec<TriggeredByRecord> {
        self.read().triggered_by.clone()
    }

    /// Identities matching the optional namespace/kind filters whose
    /// `[first_seen, last_seen]` interval intersects `[start, end]`.
    pub fn identities_in_range(
        &self,
        start: TimestampNs,
        end: TimestampNs,
        namespace: Option<&str>,
        kind: Option<&str>,
    ) -> Vec<ResourceIdentityNode> {
        let inner = self.read();
        let mut nodes: Vec<ResourceIdentityNode> = inner
            .identities
            .values()
            .filter(|node| {
                namespace.is_none_or(|ns| node.namespace == ns)
                    && kind.is_none_or(|k| node.gvk.kind == k)
                    && node.first_seen <= end
                    && node.last_seen >= start
            })
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            (&a.namespace, &a.gvk.kind, &a.name).cmp(&(&b.namespace, &b.gvk.kind, &b.name))
        });
        nodes
    }

    /// Pattern match with node-label and property predicates.
    pub fn query(&self, pattern: &Pattern) -> Vec<PatternMatch> {
        let inner = self.read();
        let mut rows = Vec::new();

        for node in inner.identities.values() {
            if !pattern.node.matches(node) {
                continue;
            }

            match &pattern.edge {
                None => rows.push(PatternMatch {
                    node: node.clone(),
                    edge: None,
                }),
                Some(constraint) => {
                    let keys: Vec<EdgeKey> = match constraint.direction {
                        Direction::Outgoing => inner
                            .edges
                            .keys()
                            .filter(|k| k.from == node.uid)
                            .cloned()
                            .collect(),
                        Direction::Incoming => inner
                            .edges_to
                            .get(&node.uid)
                            .cloned()
                            .unwrap_or_default(),
                    };

                    for key in keys {
                        if constraint.edge_type.is_some_and(|t| key.edge_type != t) {
                            continue;
                        }
                        let neighbor_uid = match constraint.direction {
                            Direction::Outgoing => &key.to,
                            Direction::Incoming => &key.from,
                        };
                        if let Some(neighbor_pattern) = &constraint.neighbor {
                            let Some(neighbor) = inner.identities.get(neighbor_uid) else {
                                continue;
                            };
                            if !neighbor_pattern.matches(neighbor) {
                                continue;
                            }
                        }
                        rows.push(PatternMatch {
                            node: node.clone(),
                            edge: Some(key),
                        });
                    }
                }
            }
        }

        rows.sort_by(|a, b| a.node.uid.cmp(&b.node.uid));
        rows
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    pub fn namespaces(&self) -> Vec<String> {
        let inner = self.read();
        let mut set: Vec<String> = inner
            .identities
            .values()
            .filter(|n| !n.namespace.is_empty())
            .map(|n| n.namespace.clone())
            .collect();
        set.sort_unstable();
        set.dedup();
        set
    }

    pub fn kinds(&self) -> Vec<String> {
        let inner = self.read();
        let mut set: Vec<String> = inner
            .identities
            .values()
            .map(|n| n.gvk.kind.clone())
            .collect();
        set.sort_unstable();
        set.dedup();
        set
    }

    pub fn groups(&self) -> Vec<String> {
        let inner = self.read();
        let mut set: Vec<String> = inner
            .identities
            .values()
            .map(|n| n.gvk.group.clone())
            .collect();
        set.sort_unstable();
        set.dedup();
        set
    }

    /// Count of identities per kind.
    pub fn resource_counts(&self) -> BTreeMap<String, usize> {
        let inner = self.read();
        let mut counts = BTreeMap::new();
        for node in inner.identities.values() {
            *counts.entry(node.gvk.kind.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_events(&self) -> usize {
        self.read().events.len()
    }

    pub fn total_identities(&self) -> usize {
        self.read().identities.len()
    }

    pub fn total_edges(&self) -> usize {
        self.read().edges.len()
    }

    /// `(earliest, latest)` change-event timestamps, when any exist.
    pub fn time_range(&self) -> Option<(TimestampNs, TimestampNs)> {
        let inner = self.read();
        let mut range: Option<(TimestampNs, TimestampNs)> = None;
        for node in inner.events.values() {
            range = Some(match range {
                None => (node.timestamp, node.timestamp),
                Some((lo, hi)) => (lo.min(node.timestamp), hi.max(node.timestamp)),
            });
        }
        range
    }

    // ========================================================================
    // Snapshot plumbing (see snapshot.rs)
    // ========================================================================

    pub(crate) fn to_snapshot(&self) -> crate::snapshot::GraphSnapshot {
        let inner = self.read();
        crate::snapshot::GraphSnapshot {
            identities: inner.identities.values().cloned().collect(),
            events: inner.events.values().cloned().collect(),
            events_by_uid: inner
                .events_by_uid
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            edges: inner.edges.values().cloned().collect(),
            triggered_by: inner.triggered_by.clone(),
        }
    }

    pub(crate) fn load_snapshot(&self, snapshot: crate::snapshot::GraphSnapshot) {
        let mut inner = self.write();
        inner.identities = snapshot
            .identities
            .into_iter()
            .map(|n| (n.uid.clone(), n))
            .collect();
        inner.watermark = snapshot
            .events
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(TimestampNs::ZERO);
        inner.events = snapshot
            .events
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        inner.events_by_uid = snapshot.events_by_uid.into_iter().collect();
        inner.edges = snapshot
            .edges
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        inner.edges_to = {
            let mut rev: HashMap<Uid, Vec<EdgeKey>> = HashMap::new();
            for key in inner.edges.keys() {
                rev.entry(key.to.clone()).or_default().push(key.clone());
            }
            rev
        };
        inner.triggered_by = snapshot.triggered_by;
    }
}
