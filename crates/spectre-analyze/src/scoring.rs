//! Path scoring: the five-factor confidence model.

use spectre_graph::ChangeEventNode;
use spectre_types::TimestampNs;

use crate::subgraph::SubEdge;
use crate::types::ConfidenceFactors;

/// Lag at which temporal proximity reaches zero (10 minutes).
const PROXIMITY_ZERO_MS: f64 = 600_000.0;

/// Spine length at which chain completeness saturates.
const CHAIN_SATURATION: f64 = 3.0;

/// Scores one candidate against one path to the symptom.
///
/// Every factor lies in `[0, 1]`; the combined confidence is their weighted
/// sum capped at 0.85.
pub fn score(
    candidate: &ChangeEventNode,
    path_edges: &[&SubEdge],
    spine_len: usize,
    failure_ts: TimestampNs,
    symptom_events: &[ChangeEventNode],
) -> ConfidenceFactors {
    ConfidenceFactors {
        direct_spec_change: direct_spec_change(candidate),
        temporal_proximity: temporal_proximity(candidate.timestamp, failure_ts),
        relationship_strength: relationship_strength(path_edges),
        chain_completeness: (spine_len as f64 / CHAIN_SATURATION).min(1.0),
        error_match: error_match(candidate, symptom_events),
    }
}

/// 1.0 for a full config change, 0.5 for a status-only update, 0 otherwise.
fn direct_spec_change(candidate: &ChangeEventNode) -> f64 {
    if candidate.config_changed {
        1.0
    } else if candidate.status_changed {
        0.5
    } else {
        0.0
    }
}

/// Linear decay from 1.0 at zero lag to 0 at ten minutes.
fn temporal_proximity(candidate_ts: TimestampNs, failure_ts: TimestampNs) -> f64 {
    let lag_ms = failure_ts.lag_ms_since(candidate_ts) as f64;
    (1.0 - lag_ms / PROXIMITY_ZERO_MS).max(0.0)
}

/// Average edge strength along the path (MANAGES 1.0, OWNS 0.8,
/// TRIGGERED_BY 0.7, everything else 0.5).
fn relationship_strength(path_edges: &[&SubEdge]) -> f64 {
    if path_edges.is_empty() {
        return 0.0;
    }
    let sum: f64 = path_edges.iter().map(|e| e.edge_type.strength()).sum();
    sum / path_edges.len() as f64
}

/// 1.0 when the candidate's error text appears in the symptom's error, 0.5
/// when they share a container-issue tag, 0 otherwise.
fn error_match(candidate: &ChangeEventNode, symptom_events: &[ChangeEventNode]) -> f64 {
    if let Some(candidate_err) = candidate
        .error_message
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        let substring_hit = symptom_events
            .iter()
            .filter_map(|e| e.error_message.as_deref())
            .any(|symptom_err| symptom_err.contains(candidate_err));
        if substring_hit {
            return 1.0;
        }
    }

    let shared_tag = candidate.container_issues.iter().any(|tag| {
        symptom_events
            .iter()
            .any(|e| e.container_issues.contains(tag))
    });
    if shared_tag { 0.5 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use spectre_types::{DerivedStatus, EdgeType, EventId, EventType, Uid};

    fn change_event(config: bool, status: bool, ts_ms: i64) -> ChangeEventNode {
        ChangeEventNode {
            id: EventId::new("e"),
            uid: Uid::new("u"),
            timestamp: TimestampNs::from_millis(ts_ms),
            event_type: EventType::Update,
            status: DerivedStatus::Ready,
            error_message: None,
            impact_score: 0.5,
            config_changed: config,
            status_changed: status,
            replicas_changed: false,
            container_issues: Vec::new(),
            data: Bytes::new(),
        }
    }

    fn edge(edge_type: EdgeType) -> SubEdge {
        SubEdge {
            from: Uid::new("a"),
            edge_type,
            to: Uid::new("b"),
        }
    }

    #[test]
    fn factors_stay_in_unit_interval_and_confidence_capped() {
        let candidate = change_event(true, true, 0);
        let e1 = edge(EdgeType::Manages);
        let e2 = edge(EdgeType::Owns);
        let factors = score(
            &candidate,
            &[&e1, &e2],
            5,
            TimestampNs::from_millis(1),
            &[],
        );
        for value in [
            factors.direct_spec_change,
            factors.temporal_proximity,
            factors.relationship_strength,
            factors.chain_completeness,
            factors.error_match,
        ] {
            assert!((0.0..=1.0).contains(&value), "factor out of range: {value}");
        }
        assert!(factors.confidence() <= crate::types::CONFIDENCE_CAP);
    }

    #[test]
    fn temporal_decays_to_zero_at_ten_minutes() {
        assert!((temporal_proximity(TimestampNs::ZERO, TimestampNs::ZERO) - 1.0).abs() < 1e-9);
        let halfway = temporal_proximity(
            TimestampNs::from_millis(0),
            TimestampNs::from_millis(300_000),
        );
        assert!((halfway - 0.5).abs() < 1e-9);
        assert!(
            temporal_proximity(
                TimestampNs::from_millis(0),
                TimestampNs::from_millis(900_000)
            ) == 0.0
        );
    }

    #[test]
    fn status_only_scores_half() {
        assert!((direct_spec_change(&change_event(false, true, 0)) - 0.5).abs() < 1e-9);
        assert!((direct_spec_change(&change_event(true, false, 0)) - 1.0).abs() < 1e-9);
        assert!(direct_spec_change(&change_event(false, false, 0)) == 0.0);
    }

    #[test]
    fn relationship_averages_strengths() {
        let manages = edge(EdgeType::Manages);
        let owns = edge(EdgeType::Owns);
        let selects = edge(EdgeType::Selects);
        let avg = relationship_strength(&[&manages, &owns, &selects]);
        assert!((avg - (1.0 + 0.8 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn error_substring_beats_shared_tag() {
        let mut candidate = change_event(true, false, 0);
        candidate.error_message = Some("image not found".to_string());
        candidate.container_issues = vec!["ImagePullBackOff".to_string()];

        let mut symptom = change_event(false, true, 10);
        symptom.error_message = Some("Back-off: image not found for container".to_string());
        symptom.container_issues = vec!["ImagePullBackOff".to_string()];

        assert!((error_match(&candidate, std::slice::from_ref(&symptom)) - 1.0).abs() < 1e-9);

        symptom.error_message = Some("unrelated".to_string());
        assert!((error_match(&candidate, &[symptom]) - 0.5).abs() < 1e-9);
    }
}
