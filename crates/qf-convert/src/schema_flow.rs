//! Schema evolution through the clause pipeline
//!
//! The converter threads a [`SchemaState`] through each statement: FROM
//! seeds it from the catalog, joins widen it, GROUP BY collapses it to
//! the grouping keys, and SELECT projects it into the result shape.
//! Every transition here is a pure function from an input state to a
//! fresh output state; the caller decides which transitions also emit a
//! snapshot onto the graph.

use qf_graph::{ColumnSchema, ColumnSource, SchemaSnapshot, SnapshotSchema};
use sqlparser::ast::{Expr, SelectItem};

use crate::context::IdGen;

/// Synthetic relation name for post-aggregation state.
pub const GROUPED_RELATION: &str = "_grouped";
/// Synthetic relation name for the projected result.
pub const RESULT_RELATION: &str = "_result";

/// One named relation currently in scope (a table, a subquery alias, a
/// CTE reference, or a synthetic stage like `_grouped`).
#[derive(Debug, Clone)]
pub struct RelationState {
    /// Alias the query refers to this relation by.
    pub name: String,
    /// Physical table backing the relation, when there is one.
    pub table: Option<String>,
    /// Synthetic relations are pipeline stages, not user-visible names;
    /// wildcards and correlation checks skip them.
    pub synthetic: bool,
    pub columns: Vec<ColumnSchema>,
}

/// The full set of relations visible at one point in a statement.
#[derive(Debug, Clone, Default)]
pub struct SchemaState {
    pub relations: Vec<RelationState>,
}

impl SchemaState {
    pub fn empty() -> Self {
        SchemaState::default()
    }

    /// Case-insensitive lookup of a relation by alias.
    pub fn relation(&self, alias: &str) -> Option<&RelationState> {
        let lower = alias.to_lowercase();
        self.relations.iter().find(|r| r.name.to_lowercase() == lower)
    }

    pub fn relation_mut(&mut self, alias: &str) -> Option<&mut RelationState> {
        let lower = alias.to_lowercase();
        self.relations
            .iter_mut()
            .find(|r| r.name.to_lowercase() == lower)
    }

    /// The single non-synthetic relation, if exactly one is in scope.
    /// Unqualified column discovery attributes new columns here.
    pub fn sole_relation_mut(&mut self) -> Option<&mut RelationState> {
        let mut found = None;
        for (idx, rel) in self.relations.iter().enumerate() {
            if rel.synthetic {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some(idx);
        }
        found.map(move |idx| &mut self.relations[idx])
    }

    /// All columns in relation order, the shape snapshots record.
    pub fn flat_columns(&self) -> Vec<ColumnSchema> {
        self.relations
            .iter()
            .flat_map(|r| r.columns.iter().cloned())
            .collect()
    }

    /// Resolves a column reference; a qualifier restricts the search to
    /// the matching relation, otherwise the first name match wins.
    pub fn find_column(&self, qualifier: Option<&str>, name: &str) -> Option<&ColumnSchema> {
        let lower = name.to_lowercase();
        match qualifier {
            Some(q) => self
                .relation(q)?
                .columns
                .iter()
                .find(|c| c.name.to_lowercase() == lower),
            None => self
                .relations
                .iter()
                .flat_map(|r| r.columns.iter())
                .find(|c| c.name.to_lowercase() == lower),
        }
    }

    pub fn column_exists(&self, qualifier: Option<&str>, name: &str) -> bool {
        self.find_column(qualifier, name).is_some()
    }
}

/// Appends a relation to the state.
pub fn with_relation(state: &SchemaState, relation: RelationState) -> SchemaState {
    let mut next = state.clone();
    next.relations.push(relation);
    next
}

/// GROUP BY collapses the state to the grouping keys.
///
/// Keys that resolve keep their type and provenance; anything else (an
/// expression key, or a reference nothing declared) comes through as an
/// untyped unknown so downstream projection still sees its name.
pub fn grouped(
    state: &SchemaState,
    group_exprs: &[Expr],
    ids: &mut IdGen,
    node_id: &str,
) -> SchemaState {
    let mut columns = Vec::with_capacity(group_exprs.len());
    for expr in group_exprs {
        let column = match expr {
            Expr::Identifier(ident) => key_column(state, None, &ident.value, ids, node_id),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let qualifier = parts[parts.len() - 2].value.as_str();
                let name = parts[parts.len() - 1].value.as_str();
                key_column(state, Some(qualifier), name, ids, node_id)
            }
            other => ColumnSchema {
                id: ids.column_id(),
                name: infer_column_name(other),
                data_type: None,
                source: ColumnSource::Expression,
                table: None,
                source_node: Some(node_id.to_string()),
            },
        };
        columns.push(column);
    }

    SchemaState {
        relations: vec![RelationState {
            name: GROUPED_RELATION.to_string(),
            table: None,
            synthetic: true,
            columns,
        }],
    }
}

fn key_column(
    state: &SchemaState,
    qualifier: Option<&str>,
    name: &str,
    ids: &mut IdGen,
    node_id: &str,
) -> ColumnSchema {
    match state.find_column(qualifier, name) {
        Some(found) => {
            let mut column = found.clone();
            column.id = ids.column_id();
            column.source_node = Some(node_id.to_string());
            column
        }
        None => ColumnSchema {
            id: ids.column_id(),
            name: name.to_string(),
            data_type: None,
            source: ColumnSource::Unknown,
            table: None,
            source_node: Some(node_id.to_string()),
        },
    }
}

/// SELECT replaces the state with a single `_result` relation holding
/// exactly the projected columns, in projection order.
pub fn projected(
    state: &SchemaState,
    items: &[SelectItem],
    ids: &mut IdGen,
    node_id: &str,
) -> SchemaState {
    let mut columns = Vec::new();

    for item in items {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                columns.push(projected_column(state, expr, None, ids, node_id));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                columns.push(projected_column(
                    state,
                    expr,
                    Some(alias.value.as_str()),
                    ids,
                    node_id,
                ));
            }
            SelectItem::Wildcard(_) => {
                for col in state.flat_columns() {
                    let mut column = col;
                    column.id = ids.column_id();
                    column.source_node = Some(node_id.to_string());
                    columns.push(column);
                }
            }
            SelectItem::QualifiedWildcard(kind, _) => {
                let alias = kind.to_string();
                match state.relation(&alias) {
                    Some(rel) => {
                        for col in &rel.columns {
                            let mut column = col.clone();
                            column.id = ids.column_id();
                            column.source_node = Some(node_id.to_string());
                            columns.push(column);
                        }
                    }
                    None => {
                        log::warn!("Qualified wildcard '{alias}.*' matches no relation in scope");
                    }
                }
            }
        }
    }

    SchemaState {
        relations: vec![RelationState {
            name: RESULT_RELATION.to_string(),
            table: None,
            synthetic: true,
            columns,
        }],
    }
}

fn projected_column(
    state: &SchemaState,
    expr: &Expr,
    alias: Option<&str>,
    ids: &mut IdGen,
    node_id: &str,
) -> ColumnSchema {
    match expr {
        Expr::Identifier(ident) => {
            named_column(state, None, &ident.value, alias, ids, node_id)
        }
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let qualifier = parts[parts.len() - 2].value.as_str();
            let name = parts[parts.len() - 1].value.as_str();
            named_column(state, Some(qualifier), name, alias, ids, node_id)
        }
        Expr::Function(func) => {
            let fn_name = func.name.to_string();
            if is_aggregate_function(&fn_name.to_uppercase()) {
                ColumnSchema {
                    id: ids.column_id(),
                    name: alias
                        .map(str::to_string)
                        .unwrap_or_else(|| fn_name.to_lowercase()),
                    data_type: Some("numeric".to_string()),
                    source: ColumnSource::Aggregate,
                    table: None,
                    source_node: Some(node_id.to_string()),
                }
            } else {
                expression_column(alias, expr, ids, node_id)
            }
        }
        other => expression_column(alias, other, ids, node_id),
    }
}

fn named_column(
    state: &SchemaState,
    qualifier: Option<&str>,
    name: &str,
    alias: Option<&str>,
    ids: &mut IdGen,
    node_id: &str,
) -> ColumnSchema {
    // Qualified refs fall back to an unqualified search so grouped state,
    // which folds relations together, still resolves.
    let found = state
        .find_column(qualifier, name)
        .or_else(|| qualifier.and_then(|_| state.find_column(None, name)));
    match found {
        Some(col) => {
            let mut column = col.clone();
            column.id = ids.column_id();
            column.source_node = Some(node_id.to_string());
            if let Some(alias) = alias {
                column.name = alias.to_string();
            }
            column
        }
        None => ColumnSchema {
            id: ids.column_id(),
            name: alias.unwrap_or(name).to_string(),
            data_type: None,
            source: ColumnSource::Unknown,
            table: None,
            source_node: Some(node_id.to_string()),
        },
    }
}

fn expression_column(
    alias: Option<&str>,
    expr: &Expr,
    ids: &mut IdGen,
    node_id: &str,
) -> ColumnSchema {
    ColumnSchema {
        id: ids.column_id(),
        name: alias
            .map(str::to_string)
            .unwrap_or_else(|| infer_column_name(expr)),
        data_type: None,
        source: ColumnSource::Expression,
        table: None,
        source_node: Some(node_id.to_string()),
    }
}

/// UNION merges both branch results by column name, left-biased: the
/// left branch fixes order and metadata, right-only columns append.
pub fn unioned(left: &SchemaState, right: &SchemaState, ids: &mut IdGen, node_id: &str) -> SchemaState {
    let mut columns: Vec<ColumnSchema> = Vec::new();
    for col in left.flat_columns() {
        let mut column = col;
        column.id = ids.column_id();
        column.source_node = Some(node_id.to_string());
        columns.push(column);
    }
    for col in right.flat_columns() {
        let lower = col.name.to_lowercase();
        if columns.iter().any(|c| c.name.to_lowercase() == lower) {
            continue;
        }
        let mut column = col;
        column.id = ids.column_id();
        column.source_node = Some(node_id.to_string());
        columns.push(column);
    }

    SchemaState {
        relations: vec![RelationState {
            name: RESULT_RELATION.to_string(),
            table: None,
            synthetic: true,
            columns,
        }],
    }
}

/// Records the state as a snapshot attached to a node.
pub fn snapshot(state: &SchemaState, node_id: &str) -> SchemaSnapshot {
    SchemaSnapshot {
        node_id: node_id.to_string(),
        schema: SnapshotSchema {
            columns: state.flat_columns(),
        },
    }
}

/// Infer a column name from an expression (used when no alias is given)
pub fn infer_column_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_else(|| "?column?".to_string()),
        Expr::Function(f) => f.name.to_string().to_lowercase(),
        Expr::Cast { expr, .. } => infer_column_name(expr),
        Expr::Nested(inner) => infer_column_name(inner),
        _ => "?column?".to_string(),
    }
}

/// Check if a function name is a known aggregate
pub fn is_aggregate_function(name: &str) -> bool {
    matches!(
        name,
        "COUNT"
            | "SUM"
            | "AVG"
            | "MIN"
            | "MAX"
            | "BOOL_AND"
            | "BOOL_OR"
            | "EVERY"
            | "STRING_AGG"
            | "ARRAY_AGG"
            | "LISTAGG"
            | "GROUP_CONCAT"
    )
}

#[cfg(test)]
#[path = "schema_flow_test.rs"]
mod tests;
