//! Graph nodes — operators, clauses, relations, and subqueries

use crate::graph::Graph;
use serde::{Deserialize, Serialize};

/// What a node represents in the flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// A relational operator (SELECT projection, JOIN, UNION, UPDATE, ...)
    Op,
    /// A clause step that filters or reshapes rows (WHERE, GROUP BY, ...)
    Clause,
    /// A named relation entering the pipeline (FROM table, CTE marker)
    Relation,
    /// A nested query carrying its own inner graph
    Subquery,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Op => write!(f, "op"),
            NodeKind::Clause => write!(f, "clause"),
            NodeKind::Relation => write!(f, "relation"),
            NodeKind::Subquery => write!(f, "subquery"),
        }
    }
}

/// How a subquery is consumed by its enclosing clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubqueryType {
    /// Produces a single value (scalar position or derived table)
    Scalar,
    /// Right-hand side of an IN predicate
    In,
    /// EXISTS predicate
    Exists,
}

impl std::fmt::Display for SubqueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubqueryType::Scalar => write!(f, "scalar"),
            SubqueryType::In => write!(f, "in"),
            SubqueryType::Exists => write!(f, "exists"),
        }
    }
}

/// Payload carried by `NodeKind::Subquery` nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubqueryInfo {
    /// How the enclosing clause consumes the subquery's result
    pub subquery_type: SubqueryType,
    /// Fully independent graph for the nested statement; node and edge ids
    /// inside it carry a `subq_<n>_` prefix so flattening into any outer
    /// graph cannot collide
    pub inner_graph: Graph,
    /// Qualified `alias.column` references the inner query resolves against
    /// an enclosing table scope; empty when the subquery is uncorrelated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlated_fields: Vec<String>,
}

/// One node of the flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the owning graph, minted by a monotonic counter
    pub id: String,
    /// Node category (closed four-member enum)
    pub kind: NodeKind,
    /// Renderer-facing label, e.g. `FROM users` or `LEFT JOIN orders`
    pub label: String,
    /// Display text of the clause's expression, when the node has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Present exactly when `kind == Subquery`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery: Option<SubqueryInfo>,
}

impl Node {
    /// Create a plain node without SQL text or subquery payload
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            sql: None,
            subquery: None,
        }
    }

    /// Attach clause SQL display text
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}
