//! Edge records and the upsert/dedup rule.

use serde::{Deserialize, Serialize};
use spectre_types::{EdgeType, EventId, Evidence, TimestampNs, Uid, ValidationState};

/// Key of a resource-to-resource edge: one edge per `(from, type, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: Uid,
    pub edge_type: EdgeType,
    pub to: Uid,
}

/// Optional properties carried by an edge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeProps {
    /// Confidence in `[0, 1]`. Structural edges (OWNS, SCHEDULED_ON, ...)
    /// use 1.0; inferred MANAGES edges start lower.
    pub confidence: f64,
    pub validation_state: ValidationState,
    pub evidence: Vec<Evidence>,
    /// For REFERENCES_SPEC: the referenced kind (`Secret`, `ConfigMap`, ...).
    pub ref_kind: Option<String>,
    /// For REFERENCES_SPEC: the spec field path that holds the reference.
    pub field_path: Option<String>,
    /// For GRANTS_TO: the subject kind (`ServiceAccount`, `User`, `Group`).
    pub subject_kind: Option<String>,
}

impl EdgeProps {
    /// Properties for a structural (fully trusted) edge.
    pub fn structural() -> Self {
        Self {
            confidence: 1.0,
            validation_state: ValidationState::Validated,
            ..Self::default()
        }
    }
}

/// A stored resource-to-resource edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub key: EdgeKey,
    pub confidence: f64,
    pub first_observed: TimestampNs,
    pub last_validated: TimestampNs,
    pub validation_state: ValidationState,
    pub evidence: Vec<Evidence>,
    pub ref_kind: Option<String>,
    pub field_path: Option<String>,
    pub subject_kind: Option<String>,
}

impl EdgeRecord {
    pub fn new(key: EdgeKey, props: EdgeProps, observed_at: TimestampNs) -> Self {
        Self {
            key,
            confidence: props.confidence,
            first_observed: observed_at,
            last_validated: observed_at,
            validation_state: props.validation_state,
            evidence: props.evidence,
            ref_kind: props.ref_kind,
            field_path: props.field_path,
            subject_kind: props.subject_kind,
        }
    }

    /// Applies a repeat observation of the same `(from, type, to)` edge.
    ///
    /// `last_validated` advances, evidence merges (deduplicated by
    /// kind+detail), confidence takes the maximum, and a tentative edge seen
    /// again is promoted to validated.
    pub fn reinforce(&mut self, props: EdgeProps, observed_at: TimestampNs) {
        self.last_validated = self.last_validated.max(observed_at);
        self.confidence = self.confidence.max(props.confidence);

        for item in props.evidence {
            if !self.evidence.contains(&item) {
                self.evidence.push(item);
            }
        }

        if self.validation_state == ValidationState::Tentative
            && props.validation_state != ValidationState::Rejected
        {
            self.validation_state = ValidationState::Validated;
        }
        if props.ref_kind.is_some() {
            self.ref_kind = props.ref_kind;
        }
        if props.field_path.is_some() {
            self.field_path = props.field_path;
        }
        if props.subject_kind.is_some() {
            self.subject_kind = props.subject_kind;
        }
    }
}

/// An edge emitted by an extractor, before the store applies the upsert rule.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeUpsert {
    pub from: Uid,
    pub edge_type: EdgeType,
    pub to: Uid,
    pub props: EdgeProps,
}

impl EdgeUpsert {
    pub fn structural(from: Uid, edge_type: EdgeType, to: Uid) -> Self {
        Self {
            from,
            edge_type,
            to,
            props: EdgeProps::structural(),
        }
    }
}

/// A causal link between two change events.
///
/// Keyed by `(from_event, to_event)`; repeat inferences are stored as-is,
/// without cross-time dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredByRecord {
    pub from_event: EventId,
    pub to_event: EventId,
    pub confidence: f64,
    pub lag_ms: i64,
    pub reason: String,
}
