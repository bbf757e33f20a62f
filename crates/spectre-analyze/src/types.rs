//! Analyzer request and result types.

use serde::Serialize;
use spectre_types::{DerivedStatus, EdgeType, EventId, GroupVersionKind, TimestampNs, Uid};
use thiserror::Error;

/// Defaults and caps for [`RootCauseQuery`].
pub const DEFAULT_LOOKBACK_NS: i64 = 30 * 60 * 1_000_000_000;
pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const MAX_DEPTH_CAP: usize = 10;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_MAX_PATHS: usize = 5;
pub const MAX_PATHS_CAP: usize = 20;

/// Change events attached per subgraph node, most recent kept.
pub const EVENTS_PER_NODE_CAP: usize = 10;

/// Confidence is capped below certainty: the graph is inferred, not proven.
pub const CONFIDENCE_CAP: f64 = 0.85;

/// A root-cause query.
#[derive(Debug, Clone)]
pub struct RootCauseQuery {
    /// The symptom resource.
    pub resource_uid: Uid,
    /// When the symptom was observed.
    pub failure_timestamp: TimestampNs,
    /// How far back to look for causes. Defaults to 30 minutes.
    pub lookback_ns: i64,
    pub max_depth: usize,
    pub min_confidence: f64,
    pub max_paths: usize,
}

impl RootCauseQuery {
    pub fn new(resource_uid: Uid, failure_timestamp: TimestampNs) -> Self {
        Self {
            resource_uid,
            failure_timestamp,
            lookback_ns: DEFAULT_LOOKBACK_NS,
            max_depth: DEFAULT_MAX_DEPTH,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }

    /// Clamps depth and path count to their caps.
    pub fn clamped(mut self) -> Self {
        self.max_depth = self.max_depth.clamp(1, MAX_DEPTH_CAP);
        self.max_paths = self.max_paths.clamp(1, MAX_PATHS_CAP);
        self.min_confidence = self.min_confidence.clamp(0.0, 1.0);
        self
    }

    /// The failure window `[failure - lookback, failure]`.
    pub fn window(&self) -> (TimestampNs, TimestampNs) {
        (
            self.failure_timestamp - self.lookback_ns,
            self.failure_timestamp,
        )
    }
}

/// Analyzer failures.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The symptom uid has never been observed.
    #[error("resource {uid} not found in graph")]
    SymptomNotFound { uid: Uid },

    /// The per-call deadline expired; no partial result is returned.
    #[error("root-cause analysis deadline exceeded")]
    DeadlineExceeded,
}

/// Result type for analyzer operations.
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Compact description of a graph node in analyzer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub uid: Uid,
    #[serde(flatten)]
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
}

/// A change event surfaced as a candidate or as context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: EventId,
    pub timestamp: TimestampNs,
    pub status: DerivedStatus,
    pub config_changed: bool,
    pub status_changed: bool,
    pub error_message: Option<String>,
    pub container_issues: Vec<String>,
}

/// The five confidence factors, each in `[0, 1]`, kept separate for
/// interpretability. Storage never collapses them to one number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ConfidenceFactors {
    pub direct_spec_change: f64,
    pub temporal_proximity: f64,
    pub relationship_strength: f64,
    pub chain_completeness: f64,
    pub error_match: f64,
}

impl ConfidenceFactors {
    pub const WEIGHT_SPEC: f64 = 0.35;
    pub const WEIGHT_TEMPORAL: f64 = 0.30;
    pub const WEIGHT_RELATIONSHIP: f64 = 0.20;
    pub const WEIGHT_CHAIN: f64 = 0.10;
    pub const WEIGHT_ERROR: f64 = 0.05;

    /// The weighted sum, capped at [`CONFIDENCE_CAP`].
    pub fn confidence(&self) -> f64 {
        let weighted = Self::WEIGHT_SPEC * self.direct_spec_change
            + Self::WEIGHT_TEMPORAL * self.temporal_proximity
            + Self::WEIGHT_RELATIONSHIP * self.relationship_strength
            + Self::WEIGHT_CHAIN * self.chain_completeness
            + Self::WEIGHT_ERROR * self.error_match;
        weighted.min(CONFIDENCE_CAP)
    }
}

/// One step in a causal path: the node plus the relationship to the next
/// step (absent on the last step).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub node: NodeDescriptor,
    pub relationship: Option<EdgeType>,
}

/// A scored causal path from a candidate root cause down to the symptom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CausalPath {
    /// Ordered root → symptom. The interior (everything but the first and
    /// last node) is the spine.
    pub steps: Vec<PathStep>,
    /// The root-cause change event this path explains.
    pub candidate: EventSummary,
    pub factors: ConfidenceFactors,
    pub confidence: f64,
    /// Milliseconds between the candidate change and the failure.
    pub lag_ms: i64,
}

impl CausalPath {
    /// Spine length: interior nodes between root and symptom.
    pub fn spine_len(&self) -> usize {
        self.steps.len().saturating_sub(2)
    }
}

/// An edge included in the returned subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubgraphEdge {
    pub from: Uid,
    pub edge_type: EdgeType,
    pub to: Uid,
}

/// The bounded neighborhood the analysis ran over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgraphView {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<SubgraphEdge>,
}

/// The full analysis result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCauseResult {
    pub symptom: NodeDescriptor,
    pub symptom_events: Vec<EventSummary>,
    /// Ranked best-first.
    pub paths: Vec<CausalPath>,
    /// The host node of the top-ranked path's candidate.
    pub root_cause: Option<NodeDescriptor>,
    /// Factor decomposition of the top-ranked path.
    pub factors: Option<ConfidenceFactors>,
    /// Short human-readable supporting evidence records.
    pub evidence: Vec<String>,
    pub subgraph: SubgraphView,
}
