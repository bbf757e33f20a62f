//! Graph node types.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spectre_types::{DerivedStatus, EventId, EventType, GroupVersionKind, TimestampNs, Uid};

/// One node per `uid` ever observed.
///
/// # Invariants
///
/// - `first_seen <= last_seen`
/// - `deleted == true` implies `deleted_at` is set
/// - a same-uid CREATE after a DELETE reopens the node (clears `deleted`,
///   keeps history)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentityNode {
    pub uid: Uid,
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
    pub first_seen: TimestampNs,
    pub last_seen: TimestampNs,
    pub deleted: bool,
    pub deleted_at: Option<TimestampNs>,
    /// Kubernetes labels from the most recent observation.
    pub labels: BTreeMap<String, String>,
}

impl ResourceIdentityNode {
    pub fn kind(&self) -> &str {
        &self.gvk.kind
    }

    /// `true` if every `(key, value)` in `selector` matches this node's
    /// labels (standard label-selector subset semantics).
    pub fn matches_labels(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|have| have == v))
    }
}

/// One node per accepted event, attached to exactly one resource identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEventNode {
    pub id: EventId,
    /// The owning resource identity (the implicit CHANGED_AT relation).
    pub uid: Uid,
    pub timestamp: TimestampNs,
    pub event_type: EventType,
    pub status: DerivedStatus,
    pub error_message: Option<String>,
    /// Heuristic blast-radius estimate in `[0, 1]`.
    pub impact_score: f64,
    pub config_changed: bool,
    pub status_changed: bool,
    pub replicas_changed: bool,
    /// Short tags such as `ImagePullBackOff`, ordered as observed.
    pub container_issues: Vec<String>,
    /// Resource document snapshot at this event.
    pub data: Bytes,
}

impl ChangeEventNode {
    /// Parses the document snapshot as JSON, if present.
    pub fn data_json(&self) -> Option<serde_json::Value> {
        if self.data.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.data).ok()
    }
}
