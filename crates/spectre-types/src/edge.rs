//! Typed graph edges.
//!
//! All edges are directed. Every type except `TRIGGERED_BY` connects two
//! `ResourceIdentity` nodes; `TRIGGERED_BY` connects two `ChangeEvent` nodes.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The relationship types the extractor pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Kubernetes ownerReferences chain (controller-true preferred).
    Owns,
    /// Declarative management inferred from labels plus temporal proximity
    /// (Flux Kustomization/HelmRelease, ArgoCD Application).
    Manages,
    /// Label-selector match (Service, NetworkPolicy, controller templates).
    Selects,
    /// Pod placement on a Node.
    ScheduledOn,
    /// Pod to its ServiceAccount.
    UsesServiceAccount,
    /// (Cluster)RoleBinding to its subjects.
    GrantsTo,
    /// Spec field reference (Ingress backend, env valueFrom, volume sources).
    ReferencesSpec,
    /// Inferred causal link between two change events.
    TriggeredBy,
}

impl EdgeType {
    pub const ALL: [EdgeType; 8] = [
        EdgeType::Owns,
        EdgeType::Manages,
        EdgeType::Selects,
        EdgeType::ScheduledOn,
        EdgeType::UsesServiceAccount,
        EdgeType::GrantsTo,
        EdgeType::ReferencesSpec,
        EdgeType::TriggeredBy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Owns => "OWNS",
            EdgeType::Manages => "MANAGES",
            EdgeType::Selects => "SELECTS",
            EdgeType::ScheduledOn => "SCHEDULED_ON",
            EdgeType::UsesServiceAccount => "USES_SERVICE_ACCOUNT",
            EdgeType::GrantsTo => "GRANTS_TO",
            EdgeType::ReferencesSpec => "REFERENCES_SPEC",
            EdgeType::TriggeredBy => "TRIGGERED_BY",
        }
    }

    /// Edge strength used by the analyzer's relationship factor.
    pub fn strength(self) -> f64 {
        match self {
            EdgeType::Manages => 1.0,
            EdgeType::Owns => 0.8,
            EdgeType::TriggeredBy => 0.7,
            _ => 0.5,
        }
    }

    /// Path-selection precedence: lower sorts first when the analyzer picks
    /// among equal-length paths.
    pub fn precedence(self) -> u8 {
        match self {
            EdgeType::Manages => 0,
            EdgeType::Owns => 1,
            EdgeType::ReferencesSpec => 2,
            EdgeType::Selects => 3,
            EdgeType::ScheduledOn => 4,
            EdgeType::UsesServiceAccount => 5,
            EdgeType::GrantsTo => 6,
            EdgeType::TriggeredBy => 7,
        }
    }
}

impl Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an inferred MANAGES edge.
///
/// Edges start `Tentative` and are promoted to `Validated` when a later
/// update event reinforces the match. `Rejected` edges are kept for
/// explainability but never traversed by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    #[default]
    Tentative,
    Validated,
    Rejected,
}

impl Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::Tentative => "tentative",
            ValidationState::Validated => "validated",
            ValidationState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One piece of supporting evidence on an edge.
///
/// Evidence accumulates across upserts and is deduplicated by
/// `(kind, detail)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evidence {
    /// Short category tag: `label-match`, `naming-pattern`,
    /// `temporal-proximity`, `destination-namespace`, `spec-field`.
    pub kind: String,
    pub detail: String,
}

impl Evidence {
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strengths_match_scoring_table() {
        assert!((EdgeType::Manages.strength() - 1.0).abs() < f64::EPSILON);
        assert!((EdgeType::Owns.strength() - 0.8).abs() < f64::EPSILON);
        assert!((EdgeType::TriggeredBy.strength() - 0.7).abs() < f64::EPSILON);
        assert!((EdgeType::Selects.strength() - 0.5).abs() < f64::EPSILON);
        assert!((EdgeType::GrantsTo.strength() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn precedence_orders_manages_first() {
        let mut all = EdgeType::ALL;
        all.sort_by_key(|t| t.precedence());
        assert_eq!(all[0], EdgeType::Manages);
        assert_eq!(all[1], EdgeType::Owns);
        assert_eq!(all[2], EdgeType::ReferencesSpec);
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&EdgeType::ScheduledOn).unwrap(),
            "\"SCHEDULED_ON\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeType::UsesServiceAccount).unwrap(),
            "\"USES_SERVICE_ACCOUNT\""
        );
    }
}
