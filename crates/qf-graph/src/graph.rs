//! The graph arena — ordered nodes, edges, and the snapshot log

use crate::edge::{Edge, EdgeKind};
use crate::node::Node;
use crate::schema::SchemaSnapshot;
use serde::{Deserialize, Serialize};

/// The engine's sole output: an insertion-ordered arena of nodes and edges
/// plus the append-only schema snapshot log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    /// Nodes in insertion order
    pub nodes: Vec<Node>,
    /// Edges in insertion order
    pub edges: Vec<Edge>,
    /// Snapshot log, one entry per relation-affecting step
    pub snapshots: Vec<SchemaSnapshot>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, returning its id
    pub fn push_node(&mut self, node: Node) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Append an edge
    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Append a snapshot
    pub fn push_snapshot(&mut self, snapshot: SchemaSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Find a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find the snapshot recorded for a node, if any
    pub fn snapshot_for(&self, node_id: &str) -> Option<&SchemaSnapshot> {
        self.snapshots.iter().find(|s| s.node_id == node_id)
    }

    /// The terminal step of the converted statement: the last node with no
    /// outgoing `flow` edge. This may not be the last node added — subquery
    /// and CTE marker nodes are appended out of band, and clause nodes like
    /// ORDER BY are only present when the statement carries them.
    pub fn terminal_node(&self) -> Option<&Node> {
        self.nodes.iter().rev().find(|n| {
            n.kind != crate::node::NodeKind::Subquery
                && !self
                    .edges
                    .iter()
                    .any(|e| e.kind == EdgeKind::Flow && e.from.node == n.id)
        })
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges of a given kind, in insertion order
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }
}
