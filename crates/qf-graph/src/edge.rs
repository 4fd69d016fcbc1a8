//! Graph edges — sequencing and data-dependency links between nodes

use serde::{Deserialize, Serialize};

/// Edge category (closed six-member enum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Operator sequencing: FROM -> WHERE -> SELECT ...
    Flow,
    /// A step reads from a previously defined relation (CTE reference)
    Uses,
    /// A CTE body's terminal node defines its named CTE marker
    Defines,
    /// A converted query's result materializes into a created table
    MapsTo,
    /// A subquery node feeds its result into the consuming clause;
    /// the label matches the printer's placeholder token
    SubqueryResult,
    /// A subquery references a column owned by an enclosing table scope
    Correlation,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Flow => write!(f, "flow"),
            EdgeKind::Uses => write!(f, "uses"),
            EdgeKind::Defines => write!(f, "defines"),
            EdgeKind::MapsTo => write!(f, "mapsTo"),
            EdgeKind::SubqueryResult => write!(f, "subqueryResult"),
            EdgeKind::Correlation => write!(f, "correlation"),
        }
    }
}

/// One end of an edge; `handle` names a renderer port when relevant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Id of the node this end attaches to
    pub node: String,
    /// Optional renderer port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Endpoint {
    /// Endpoint without a port handle
    pub fn node(id: impl Into<String>) -> Self {
        Self {
            node: id.into(),
            handle: None,
        }
    }
}

/// One edge of the flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique within the owning graph
    pub id: String,
    /// Edge category
    pub kind: EdgeKind,
    /// Source endpoint
    pub from: Endpoint,
    /// Target endpoint
    pub to: Endpoint,
    /// Optional display label (placeholder token, correlated column, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
