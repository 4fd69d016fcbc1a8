//! qf-graph: the flow-graph IR produced by the QueryFlow conversion engine
//!
//! A [`Graph`] is an append-only arena of nodes, edges, and schema snapshots.
//! Insertion order is semantically meaningful: renderers that lack layout
//! information fall back to it. Everything here is serde-serializable so the
//! structured-data back-end can dump graphs as JSON unchanged.

pub mod edge;
pub mod graph;
pub mod node;
pub mod schema;

pub use edge::{Edge, EdgeKind, Endpoint};
pub use graph::Graph;
pub use node::{Node, NodeKind, SubqueryInfo, SubqueryType};
pub use schema::{ColumnSchema, ColumnSource, SchemaSnapshot, SnapshotSchema};
