//! Per-statement conversion state
//!
//! Everything a single statement's conversion needs travels in one
//! [`ConversionContext`] value: id counters, the evolving schema state,
//! CTE registrations, and the placeholder table used when subqueries are
//! printed inside outer expressions. Nothing leaks between statements;
//! a fresh context is built per statement.

use std::collections::{BTreeSet, HashMap};

use qf_graph::ColumnSchema;

use crate::catalog::TableCatalog;
use crate::schema_flow::SchemaState;

/// Monotonic id source for one graph's nodes, edges and columns.
///
/// Ids are minted with the context prefix already applied, so ids from
/// nested subquery graphs never collide with outer ids even if a caller
/// flattens all graphs into one namespace.
#[derive(Debug, Clone)]
pub struct IdGen {
    prefix: String,
    node_seq: usize,
    edge_seq: usize,
    col_seq: usize,
}

impl IdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        IdGen {
            prefix: prefix.into(),
            node_seq: 0,
            edge_seq: 0,
            col_seq: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn node_id(&mut self) -> String {
        let id = format!("{}n{}", self.prefix, self.node_seq);
        self.node_seq += 1;
        id
    }

    pub fn edge_id(&mut self) -> String {
        let id = format!("{}e{}", self.prefix, self.edge_seq);
        self.edge_seq += 1;
        id
    }

    pub fn column_id(&mut self) -> String {
        let id = format!("{}col{}", self.prefix, self.col_seq);
        self.col_seq += 1;
        id
    }
}

/// A CTE registered earlier in the same statement.
#[derive(Debug, Clone)]
pub struct CteEntry {
    /// Marker node drawn for the definition; referencing FROM nodes get a
    /// uses-edge back to it.
    pub marker_node: String,
    /// Column set the CTE body exposes at its terminal node.
    pub columns: Vec<ColumnSchema>,
}

/// Mutable state for converting one statement (or one subquery).
pub struct ConversionContext<'a> {
    pub catalog: &'a TableCatalog,
    pub ids: IdGen,
    pub state: SchemaState,
    /// CTEs visible to this scope, keyed by lowercased name.
    pub ctes: HashMap<String, CteEntry>,
    /// Alias (lowercased) to the node id that introduced it. Subquery
    /// conversion reads this from the parent to anchor correlation edges.
    pub alias_nodes: HashMap<String, String>,
    /// Aliases (lowercased) the current SELECT block's FROM brought into
    /// scope. Unlike the schema state, this set survives the GROUP BY
    /// collapse, so HAVING-side correlation still resolves against it.
    pub from_aliases: BTreeSet<String>,
    placeholders: HashMap<String, String>,
    placeholder_seq: usize,
    subquery_seq: usize,
}

impl<'a> ConversionContext<'a> {
    pub fn new(catalog: &'a TableCatalog) -> Self {
        Self::with_prefix(catalog, "")
    }

    fn with_prefix(catalog: &'a TableCatalog, prefix: &str) -> Self {
        ConversionContext {
            catalog,
            ids: IdGen::new(prefix),
            state: SchemaState::empty(),
            ctes: HashMap::new(),
            alias_nodes: HashMap::new(),
            from_aliases: BTreeSet::new(),
            placeholders: HashMap::new(),
            placeholder_seq: 0,
            subquery_seq: 0,
        }
    }

    /// Builds the context for a nested subquery.
    ///
    /// The child gets its own id namespace (`{parent}subq_{k}_`), a fresh
    /// schema state, and a read-only copy of the parent's CTEs. Aliases and
    /// placeholders do not carry over; those belong to the enclosing query.
    pub fn child(&mut self) -> ConversionContext<'a> {
        let k = self.subquery_seq;
        self.subquery_seq += 1;
        let mut child = Self::with_prefix(
            self.catalog,
            &format!("{}subq_{}_", self.ids.prefix(), k),
        );
        child.ctes = self.ctes.clone();
        child
    }

    /// Records a FROM/JOIN alias and the node that introduced it.
    pub fn register_alias(&mut self, alias: &str, node_id: &str) {
        let lower = alias.to_lowercase();
        self.alias_nodes.insert(lower.clone(), node_id.to_string());
        self.from_aliases.insert(lower);
    }

    /// Returns the placeholder token standing in for a subquery when the
    /// enclosing expression is printed.
    ///
    /// Structurally identical subqueries (same rendered SQL) share a token;
    /// the first distinct subquery in a statement is `expr`, the next
    /// `expr2`, and so on.
    pub fn placeholder_for(&mut self, fingerprint: &str) -> String {
        if let Some(token) = self.placeholders.get(fingerprint) {
            return token.clone();
        }
        self.placeholder_seq += 1;
        let token = if self.placeholder_seq == 1 {
            "expr".to_string()
        } else {
            format!("expr{}", self.placeholder_seq)
        };
        self.placeholders.insert(fingerprint.to_string(), token.clone());
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_monotonic() {
        let mut ids = IdGen::new("");
        assert_eq!(ids.node_id(), "n0");
        assert_eq!(ids.node_id(), "n1");
        assert_eq!(ids.edge_id(), "e0");
        assert_eq!(ids.column_id(), "col0");
    }

    #[test]
    fn child_prefixes_nest() {
        let catalog = TableCatalog::default();
        let mut ctx = ConversionContext::new(&catalog);
        let mut first = ctx.child();
        let mut second = ctx.child();
        assert_eq!(first.ids.node_id(), "subq_0_n0");
        assert_eq!(second.ids.node_id(), "subq_1_n0");

        let mut nested = first.child();
        assert_eq!(nested.ids.node_id(), "subq_0_subq_0_n0");
    }

    #[test]
    fn placeholders_dedupe_by_fingerprint() {
        let catalog = TableCatalog::default();
        let mut ctx = ConversionContext::new(&catalog);
        assert_eq!(ctx.placeholder_for("SELECT 1"), "expr");
        assert_eq!(ctx.placeholder_for("SELECT 2"), "expr2");
        assert_eq!(ctx.placeholder_for("SELECT 1"), "expr");
        assert_eq!(ctx.placeholder_for("SELECT 3"), "expr3");
    }
}
