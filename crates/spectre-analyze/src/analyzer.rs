//! The root-cause analyzer (component C7).
//!
//! Pure reads against the graph store; deterministic for identical inputs
//! and graph state. Long phases log warnings past their budgets (10 s for
//! the subgraph build, 5 s for scoring, 20 s total).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spectre_graph::{ChangeEventNode, GraphStore, ResourceIdentityNode};
use spectre_types::Uid;

use crate::scoring;
use crate::subgraph::{self, CausalSubgraph, SubEdge};
use crate::types::{
    AnalyzeError, AnalyzeResult, CausalPath, ConfidenceFactors, EventSummary, NodeDescriptor,
    PathStep, RootCauseQuery, RootCauseResult, SubgraphEdge, SubgraphView,
};

const BUILD_BUDGET: Duration = Duration::from_secs(10);
const SCORE_BUDGET: Duration = Duration::from_secs(5);
const TOTAL_BUDGET: Duration = Duration::from_secs(20);

/// The analyzer: read-only over the graph, safe to run queries in parallel.
#[derive(Clone)]
pub struct Analyzer {
    graph: Arc<GraphStore>,
}

impl Analyzer {
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    /// Answers "what change most likely caused this symptom".
    ///
    /// `deadline`, when given, aborts the query with
    /// [`AnalyzeError::DeadlineExceeded`]; partial data is never returned.
    pub fn root_cause(
        &self,
        query: RootCauseQuery,
        deadline: Option<Instant>,
    ) -> AnalyzeResult<RootCauseResult> {
        let started = Instant::now();
        let query = query.clamped();

        // 1. Symptom fixation.
        let symptom_node = self
            .graph
            .find_resource_by_uid(&query.resource_uid)
            .ok_or_else(|| AnalyzeError::SymptomNotFound {
                uid: query.resource_uid.clone(),
            })?;
        let window = query.window();

        // 2. Subgraph build.
        let build_started = Instant::now();
        let sub = subgraph::build(&self.graph, &query.resource_uid, window, query.max_depth);
        if build_started.elapsed() > BUILD_BUDGET {
            tracing::warn!(
                elapsed_ms = build_started.elapsed().as_millis() as u64,
                nodes = sub.nodes.len(),
                "subgraph build exceeded budget"
            );
        }
        check_deadline(deadline)?;

        let symptom_events = sub
            .events
            .get(&query.resource_uid)
            .cloned()
            .unwrap_or_default();

        // 3–5. Candidates, scoring, ranking.
        let score_started = Instant::now();
        let mut paths = self.score_candidates(&query, &sub, &symptom_events, deadline)?;
        if score_started.elapsed() > SCORE_BUDGET {
            tracing::warn!(
                elapsed_ms = score_started.elapsed().as_millis() as u64,
                candidates = paths.len(),
                "candidate scoring exceeded budget"
            );
        }

        paths.retain(|p| p.confidence >= query.min_confidence);
        rank(&mut paths);
        paths.truncate(query.max_paths);

        // 6. Output assembly.
        let top = paths.first().cloned();
        let evidence = top
            .as_ref()
            .map(|path| self.collect_evidence(path, &query))
            .unwrap_or_default();

        let result = RootCauseResult {
            symptom: describe(&symptom_node),
            symptom_events: symptom_events.iter().map(summarize).collect(),
            root_cause: top.as_ref().and_then(|p| p.steps.first()).map(|s| s.node.clone()),
            factors: top.as_ref().map(|p| p.factors),
            evidence,
            subgraph: SubgraphView {
                nodes: sub.nodes.values().map(describe).collect(),
                edges: sub
                    .edges
                    .iter()
                    .map(|e| SubgraphEdge {
                        from: e.from.clone(),
                        edge_type: e.edge_type,
                        to: e.to.clone(),
                    })
                    .collect(),
            },
            paths,
        };

        if started.elapsed() > TOTAL_BUDGET {
            tracing::warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "root-cause analysis exceeded total budget"
            );
        }
        Ok(result)
    }

    /// Enumerates config-change candidates on non-symptom nodes and scores
    /// the shortest path from each candidate's host to the symptom.
    fn score_candidates(
        &self,
        query: &RootCauseQuery,
        sub: &CausalSubgraph,
        symptom_events: &[ChangeEventNode],
        deadline: Option<Instant>,
    ) -> AnalyzeResult<Vec<CausalPath>> {
        let adjacency = sub.adjacency();
        let mut paths = Vec::new();

        for (uid, events) in &sub.events {
            if *uid == query.resource_uid {
                continue;
            }
            check_deadline(deadline)?;

            for candidate in events.iter().filter(|e| e.config_changed) {
                let Some(route) = shortest_path(&adjacency, uid, &query.resource_uid) else {
                    continue;
                };
                let path_edges: Vec<&SubEdge> =
                    route.iter().filter_map(|(_, edge)| *edge).collect();
                let spine_len = route.len().saturating_sub(2);

                let factors = scoring::score(
                    candidate,
                    &path_edges,
                    spine_len,
                    query.failure_timestamp,
                    symptom_events,
                );

                let steps = route
                    .iter()
                    .enumerate()
                    .filter_map(|(i, (node_uid, _))| {
                        let node = sub.nodes.get(node_uid)?;
                        // The relationship attaches to the edge leading to
                        // the next step.
                        let relationship = route
                            .get(i + 1)
                            .and_then(|(_, e)| *e)
                            .map(|e| e.edge_type);
                        Some(PathStep {
                            node: describe(node),
                            relationship,
                        })
                    })
                    .collect();

                paths.push(CausalPath {
                    steps,
                    candidate: summarize(candidate),
                    factors,
                    confidence: factors.confidence(),
                    lag_ms: query.failure_timestamp.lag_ms_since(candidate.timestamp),
                });
            }
        }
        Ok(paths)
    }

    /// Builds the supporting-evidence records for the winning path.
    fn collect_evidence(&self, path: &CausalPath, query: &RootCauseQuery) -> Vec<String> {
        let mut evidence = Vec::new();

        let lag_s = path.lag_ms / 1_000;
        evidence.push(format!(
            "config changed at T-{lag_s}s on {}",
            path.steps
                .first()
                .map_or_else(String::new, |s| format!(
                    "{} {}",
                    s.node.gvk.kind, s.node.name
                ))
        ));

        for pair in path.steps.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let Some(edge_type) = from.relationship else {
                continue;
            };
            // The stored edge may run in either direction relative to the
            // walk; look both ways for its evidence trail.
            let record = self
                .graph
                .get_edge(&from.node.uid, edge_type, &to.node.uid)
                .or_else(|| self.graph.get_edge(&to.node.uid, edge_type, &from.node.uid));
            if let Some(record) = record {
                for item in &record.evidence {
                    evidence.push(format!("{}: {}", item.kind, item.detail));
                }
                if record.ref_kind.is_some() {
                    evidence.push(format!(
                        "{} to {} {}",
                        edge_type,
                        record.ref_kind.as_deref().unwrap_or(""),
                        to.node.name
                    ));
                }
            }
        }

        if let Some(err) = path.candidate.error_message.as_deref() {
            evidence.push(format!("root cause error: {err}"));
        }
        let (window_start, _) = query.window();
        evidence.push(format!(
            "analysis window {} .. {}",
            window_start, query.failure_timestamp
        ));
        evidence.dedup();
        evidence
    }
}

/// BFS shortest path over the subgraph adjacency. Neighbors are visited in
/// precedence order, so among equal-length routes the one through stronger
/// relationship types wins deterministically.
fn shortest_path<'a>(
    adjacency: &'a HashMap<Uid, Vec<(Uid, &'a SubEdge)>>,
    from: &Uid,
    to: &Uid,
) -> Option<Vec<(Uid, Option<&'a SubEdge>)>> {
    if from == to {
        return Some(vec![(from.clone(), None)]);
    }

    let mut parents: HashMap<Uid, (Uid, &SubEdge)> = HashMap::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from.clone());

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = adjacency.get(&current) else {
            continue;
        };
        for (neighbor, edge) in neighbors {
            if neighbor == from || parents.contains_key(neighbor) {
                continue;
            }
            parents.insert(neighbor.clone(), (current.clone(), edge));
            if neighbor == to {
                // Reconstruct: walk parents back to the origin.
                let mut steps: Vec<(Uid, Option<&SubEdge>)> = Vec::new();
                let mut cursor = to.clone();
                while cursor != *from {
                    let (prev, edge) = parents.get(&cursor).expect("parent recorded");
                    steps.push((cursor.clone(), Some(edge)));
                    cursor = prev.clone();
                }
                steps.push((from.clone(), None));
                steps.reverse();
                return Some(steps);
            }
            queue.push_back(neighbor.clone());
        }
    }
    None
}

/// Rank: confidence desc, then smaller lag, shorter path, larger
/// direct-spec-change; uid as the final deterministic tiebreak.
fn rank(paths: &mut [CausalPath]) {
    paths.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.lag_ms.cmp(&b.lag_ms))
            .then_with(|| a.steps.len().cmp(&b.steps.len()))
            .then_with(|| {
                b.factors
                    .direct_spec_change
                    .partial_cmp(&a.factors.direct_spec_change)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
}

fn check_deadline(deadline: Option<Instant>) -> AnalyzeResult<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(AnalyzeError::DeadlineExceeded),
        _ => Ok(()),
    }
}

fn describe(node: &ResourceIdentityNode) -> NodeDescriptor {
    NodeDescriptor {
        uid: node.uid.clone(),
        gvk: node.gvk.clone(),
        namespace: node.namespace.clone(),
        name: node.name.clone(),
    }
}

fn summarize(event: &ChangeEventNode) -> EventSummary {
    EventSummary {
        id: event.id.clone(),
        timestamp: event.timestamp,
        status: event.status,
        config_changed: event.config_changed,
        status_changed: event.status_changed,
        error_message: event.error_message.clone(),
        container_issues: event.container_issues.clone(),
    }
}
