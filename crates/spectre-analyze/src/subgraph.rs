//! Causal subgraph construction.
//!
//! Bounded BFS outward from the symptom. Ownership-like edges (OWNS,
//! MANAGES) are walked inverse only — from the symptom up toward whatever
//! produced it — while the attachment edges (REFERENCES_SPEC, SELECTS,
//! SCHEDULED_ON, USES_SERVICE_ACCOUNT, GRANTS_TO) are walked in both
//! directions. Expansion stops at nodes with no candidate change (a
//! `config_changed` event) inside the failure window unless they are
//! required attachments (Node, ServiceAccount, ClusterRoleBinding), which
//! stay in the picture for explainability. Status-only churn does not keep
//! a node expanding: it cannot become a root-cause candidate.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use spectre_graph::{ChangeEventNode, GraphStore, ResourceIdentityNode};
use spectre_types::{EdgeType, TimestampNs, Uid};

use crate::types::EVENTS_PER_NODE_CAP;

/// Kinds kept and expanded regardless of change activity.
const REQUIRED_ATTACHMENTS: &[&str] = &["Node", "ServiceAccount", "ClusterRoleBinding"];

/// Edge types walked from child to owner/manager only.
const INVERSE_ONLY: &[EdgeType] = &[EdgeType::Owns, EdgeType::Manages];

/// One adjacency entry inside the subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubEdge {
    pub from: Uid,
    pub edge_type: EdgeType,
    pub to: Uid,
}

/// The bounded neighborhood used for candidate search and path scoring.
#[derive(Debug, Default)]
pub struct CausalSubgraph {
    pub nodes: BTreeMap<Uid, ResourceIdentityNode>,
    /// Window-scoped change events per node, most recent
    /// [`EVENTS_PER_NODE_CAP`] kept.
    pub events: HashMap<Uid, Vec<ChangeEventNode>>,
    pub edges: Vec<SubEdge>,
}

impl CausalSubgraph {
    /// Undirected adjacency with the directed edge retained per neighbor.
    pub fn adjacency(&self) -> HashMap<Uid, Vec<(Uid, &SubEdge)>> {
        let mut adj: HashMap<Uid, Vec<(Uid, &SubEdge)>> = HashMap::new();
        for edge in &self.edges {
            adj.entry(edge.from.clone())
                .or_default()
                .push((edge.to.clone(), edge));
            adj.entry(edge.to.clone())
                .or_default()
                .push((edge.from.clone(), edge));
        }
        for neighbors in adj.values_mut() {
            // Deterministic traversal order: strongest relationship first.
            neighbors.sort_by_key(|(uid, edge)| (edge.edge_type.precedence(), uid.clone()));
        }
        adj
    }
}

/// Builds the subgraph around `symptom` within the failure window.
pub fn build(
    graph: &GraphStore,
    symptom: &Uid,
    window: (TimestampNs, TimestampNs),
    max_depth: usize,
) -> CausalSubgraph {
    let (window_start, window_end) = window;
    let mut sub = CausalSubgraph::default();
    let mut edge_set: HashSet<SubEdge> = HashSet::new();
    let mut visited: HashSet<Uid> = HashSet::new();
    let mut queue: VecDeque<(Uid, usize)> = VecDeque::new();
    queue.push_back((symptom.clone(), 0));

    while let Some((uid, depth)) = queue.pop_front() {
        if !visited.insert(uid.clone()) {
            continue;
        }
        let Some(node) = graph.find_resource_by_uid(&uid) else {
            continue;
        };

        // Attach the node's change events inside the window, capped to the
        // most recent.
        let mut events = graph.events_for_uid(&uid, window_start, window_end, None);
        if events.len() > EVENTS_PER_NODE_CAP {
            events.drain(..events.len() - EVENTS_PER_NODE_CAP);
        }
        let has_candidate_change = events.iter().any(|e| e.config_changed);
        let required = REQUIRED_ATTACHMENTS.contains(&node.gvk.kind.as_str());
        sub.events.insert(uid.clone(), events);
        sub.nodes.insert(uid.clone(), node);

        if depth >= max_depth {
            continue;
        }
        // Leaf rule: nodes without a candidate change that are not required
        // attachments are kept but not expanded further (the symptom itself
        // always expands).
        if !has_candidate_change && !required && uid != *symptom {
            continue;
        }

        // Inverse OWNS/MANAGES: who produced this node.
        for edge in graph.edges_to(&uid) {
            if !INVERSE_ONLY.contains(&edge.key.edge_type)
                && !is_attachment(edge.key.edge_type)
            {
                continue;
            }
            edge_set.insert(SubEdge {
                from: edge.key.from.clone(),
                edge_type: edge.key.edge_type,
                to: edge.key.to.clone(),
            });
            queue.push_back((edge.key.from, depth + 1));
        }

        // Attachment edges outward: what this node references or sits on.
        for edge in graph.edges_from(&uid) {
            if !is_attachment(edge.key.edge_type) {
                continue;
            }
            edge_set.insert(SubEdge {
                from: edge.key.from.clone(),
                edge_type: edge.key.edge_type,
                to: edge.key.to.clone(),
            });
            queue.push_back((edge.key.to, depth + 1));
        }
    }

    // Drop edges whose far endpoint fell outside the depth bound.
    sub.edges = edge_set
        .into_iter()
        .filter(|e| sub.nodes.contains_key(&e.from) && sub.nodes.contains_key(&e.to))
        .collect();
    sub.edges.sort();
    sub
}

fn is_attachment(edge_type: EdgeType) -> bool {
    matches!(
        edge_type,
        EdgeType::ReferencesSpec
            | EdgeType::Selects
            | EdgeType::ScheduledOn
            | EdgeType::UsesServiceAccount
            | EdgeType::GrantsTo
    )
}
