//! Query surface request and response types.

use std::collections::BTreeMap;

use serde::Serialize;
use spectre_graph::{ChangeEventNode, ResourceIdentityNode};
use spectre_types::{DerivedStatus, EventId, EventType, GroupVersionKind, TimestampNs, Uid};

/// Time-range + filter parameters shared by `Search` and `Timeline`.
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    pub start: TimestampNs,
    pub end: TimestampNs,
    pub namespace: Option<String>,
    pub kind: Option<String>,
}

/// One change event as the query surface presents it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub id: EventId,
    pub timestamp: TimestampNs,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub status: DerivedStatus,
    pub error_message: Option<String>,
    pub impact_score: f64,
    pub config_changed: bool,
    pub status_changed: bool,
    pub replicas_changed: bool,
    pub container_issues: Vec<String>,
}

impl From<&ChangeEventNode> for EventView {
    fn from(node: &ChangeEventNode) -> Self {
        Self {
            id: node.id.clone(),
            timestamp: node.timestamp,
            event_type: node.event_type,
            status: node.status,
            error_message: node.error_message.clone(),
            impact_score: node.impact_score,
            config_changed: node.config_changed,
            status_changed: node.status_changed,
            replicas_changed: node.replicas_changed,
            container_issues: node.container_issues.clone(),
        }
    }
}

/// A resource identity plus its recent change events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub uid: Uid,
    #[serde(flatten)]
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
    pub first_seen: TimestampNs,
    pub last_seen: TimestampNs,
    pub deleted: bool,
    pub deleted_at: Option<TimestampNs>,
    pub labels: BTreeMap<String, String>,
    pub recent_events: Vec<EventView>,
}

impl ResourceSummary {
    pub fn new(node: &ResourceIdentityNode, events: &[ChangeEventNode]) -> Self {
        Self {
            uid: node.uid.clone(),
            gvk: node.gvk.clone(),
            namespace: node.namespace.clone(),
            name: node.name.clone(),
            first_seen: node.first_seen,
            last_seen: node.last_seen,
            deleted: node.deleted,
            deleted_at: node.deleted_at,
            labels: node.labels.clone(),
            recent_events: events.iter().map(EventView::from).collect(),
        }
    }
}

/// A run of consecutive change events sharing one derived status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSegment {
    pub status: DerivedStatus,
    pub start_time: TimestampNs,
    pub end_time: TimestampNs,
    /// The most recent error message inside the run, if any.
    pub error_message: Option<String>,
    /// The resource's configuration at the start of the segment.
    pub config: Option<serde_json::Value>,
}

/// A resource with its status segments and the underlying events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceTimeline {
    #[serde(flatten)]
    pub resource: ResourceSummary,
    /// Ordered by `start_time` ascending.
    pub segments: Vec<StatusSegment>,
}

/// Cluster-level aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Metadata {
    pub namespaces: Vec<String>,
    pub kinds: Vec<String>,
    pub groups: Vec<String>,
    pub resource_counts: BTreeMap<String, usize>,
    pub total_events: usize,
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub earliest: TimestampNs,
    pub latest: TimestampNs,
}

/// Builds status segments from a uid's events (already in ingest order).
pub fn segment_events(events: &[ChangeEventNode]) -> Vec<StatusSegment> {
    let mut segments: Vec<StatusSegment> = Vec::new();

    for event in events {
        match segments.last_mut() {
            Some(current) if current.status == event.status => {
                current.end_time = event.timestamp;
                if event.error_message.is_some() {
                    current.error_message = event.error_message.clone();
                }
            }
            _ => {
                segments.push(StatusSegment {
                    status: event.status,
                    start_time: event.timestamp,
                    end_time: event.timestamp,
                    error_message: event.error_message.clone(),
                    config: event.data_json(),
                });
            }
        }
    }

    debug_assert!(
        segments.windows(2).all(|w| w[0].start_time <= w[1].start_time),
        "segments must be ordered by start_time"
    );
    segments
}
