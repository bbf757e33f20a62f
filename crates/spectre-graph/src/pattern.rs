//! Typed pattern queries.
//!
//! A pattern names a node shape (kind, namespace, labels, deleted flag) and
//! optionally an edge constraint to a neighboring node shape. Matching
//! returns bound rows; the store never hands out references into itself.

use std::collections::BTreeMap;

use spectre_types::EdgeType;

use crate::edge::EdgeKey;
use crate::node::ResourceIdentityNode;

/// Shape of a resource-identity node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePattern {
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    /// Subset match against the node's labels.
    pub labels: BTreeMap<String, String>,
    pub deleted: Option<bool>,
}

impl NodePattern {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, node: &ResourceIdentityNode) -> bool {
        self.kind.as_deref().is_none_or(|k| node.gvk.kind == k)
            && self
                .namespace
                .as_deref()
                .is_none_or(|ns| node.namespace == ns)
            && self.name.as_deref().is_none_or(|n| node.name == n)
            && self.deleted.is_none_or(|d| node.deleted == d)
            && node.matches_labels(&self.labels)
    }
}

/// Direction of the edge constraint relative to the anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
}

/// Edge constraint attached to a node pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeConstraint {
    pub edge_type: Option<EdgeType>,
    pub direction: Direction,
    /// Shape the node at the other end must satisfy.
    pub neighbor: Option<NodePattern>,
}

/// A complete pattern: anchor node shape plus optional edge constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub node: NodePattern,
    pub edge: Option<EdgeConstraint>,
}

impl Pattern {
    pub fn node(node: NodePattern) -> Self {
        Self { node, edge: None }
    }

    pub fn with_edge(mut self, edge: EdgeConstraint) -> Self {
        self.edge = Some(edge);
        self
    }
}

/// One bound row returned by a pattern match.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub node: ResourceIdentityNode,
    /// The edge that satisfied the constraint, when one was required.
    pub edge: Option<EdgeKey>,
}
