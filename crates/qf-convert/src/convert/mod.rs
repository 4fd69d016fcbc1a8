//! Statement dispatch
//!
//! Entry points for turning parsed statements into flow graphs. DDL
//! feeds the catalog and produces no graph of its own (except CTAS,
//! whose query side converts like any SELECT); queries and DML each
//! produce one graph.

pub mod from;
pub mod select;
pub mod subquery;

use qf_graph::{
    ColumnSchema, ColumnSource, Edge, EdgeKind, Endpoint, Graph, Node, NodeKind,
};
use sqlparser::ast::{Expr, FromTable, Statement, TableFactor, TableObject, TableWithJoins};

use crate::catalog::TableCatalog;
use crate::context::ConversionContext;
use crate::convert::select::convert_query;
use crate::convert::subquery::{collect_subqueries, convert_subquery};
use crate::error::{ConvertError, ConvertResult};
use crate::print::{discover_columns, print_expr};
use crate::schema_flow::RelationState;

/// Converts a whole script: the catalog is built from every
/// `CREATE TABLE` first, then each statement converts against it.
/// Statements that only feed the catalog produce no graph.
pub fn convert_script(statements: &[Statement]) -> ConvertResult<Vec<Graph>> {
    let catalog = TableCatalog::extract(statements);
    let mut graphs = Vec::new();
    for statement in statements {
        if let Some(graph) = convert_statement(statement, &catalog)? {
            graphs.push(graph);
        }
    }
    Ok(graphs)
}

/// Converts one statement against a prebuilt catalog.
///
/// Returns `Ok(None)` for DDL that only declares schema. Statement
/// kinds with no graph form at all are the one hard failure here;
/// everything below statement level degrades softly.
pub fn convert_statement(
    statement: &Statement,
    catalog: &TableCatalog,
) -> ConvertResult<Option<Graph>> {
    let mut ctx = ConversionContext::new(catalog);
    let mut graph = Graph::default();

    match statement {
        Statement::Query(query) => {
            convert_query(query, &mut ctx, &mut graph)?;
            Ok(Some(graph))
        }
        Statement::CreateTable(ct) => {
            let Some(query) = &ct.query else {
                return Ok(None);
            };
            convert_query(query, &mut ctx, &mut graph)?;
            // The materialized side hangs off the true terminal step, the
            // node without an outgoing flow edge, which is not always the
            // most recently appended one.
            let terminal = graph.terminal_node().map(|n| n.id.clone());
            let create_node = graph.push_node(Node::new(
                ctx.ids.node_id(),
                NodeKind::Op,
                format!("CREATE TABLE {}", ct.name),
            ));
            if let Some(terminal) = terminal {
                graph.push_edge(Edge {
                    id: ctx.ids.edge_id(),
                    kind: EdgeKind::MapsTo,
                    from: Endpoint::node(terminal),
                    to: Endpoint::node(&create_node),
                    label: None,
                });
            }
            Ok(Some(graph))
        }
        Statement::Update(update) => {
            let target = table_name(&update.table);
            let sql = {
                let mut parts = Vec::with_capacity(update.assignments.len());
                for a in &update.assignments {
                    parts.push(format!("{} = {}", a.target, print_expr(&a.value, &mut ctx)));
                }
                parts.join(", ")
            };
            let node_id = graph.push_node(
                Node::new(
                    ctx.ids.node_id(),
                    NodeKind::Op,
                    format!("UPDATE {target}"),
                )
                .with_sql(sql),
            );
            seed_relation(&mut ctx, &target, &node_id);
            add_dml_where(update.selection.as_ref(), &mut ctx, &mut graph, &node_id)?;
            Ok(Some(graph))
        }
        Statement::Delete(delete) => {
            let tables = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
            };
            let target = tables.first().map(table_name).unwrap_or_default();
            let node_id = graph.push_node(Node::new(
                ctx.ids.node_id(),
                NodeKind::Op,
                format!("DELETE FROM {target}"),
            ));
            seed_relation(&mut ctx, &target, &node_id);
            add_dml_where(delete.selection.as_ref(), &mut ctx, &mut graph, &node_id)?;
            Ok(Some(graph))
        }
        Statement::Insert(insert) => {
            let target = match &insert.table {
                TableObject::TableName(name) => name.to_string(),
                TableObject::TableFunction(f) => f.to_string(),
            };
            graph.push_node(Node::new(
                ctx.ids.node_id(),
                NodeKind::Op,
                format!("INSERT INTO {target}"),
            ));
            Ok(Some(graph))
        }
        other => Err(ConvertError::UnsupportedStatement {
            kind: statement_kind(other).to_string(),
        }),
    }
}

/// WHERE handling shared by UPDATE and DELETE. DML graphs get clause
/// nodes and subquery edges but no snapshots; schema evolution is a
/// query-side concept.
fn add_dml_where(
    selection: Option<&Expr>,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
    head: &str,
) -> ConvertResult<()> {
    let Some(selection) = selection else {
        return Ok(());
    };
    let sql = print_expr(selection, ctx);
    let node_id = graph.push_node(
        Node::new(ctx.ids.node_id(), NodeKind::Clause, "WHERE").with_sql(sql),
    );
    for (sq_type, query) in collect_subqueries(selection) {
        convert_subquery(query, sq_type, ctx, graph, &node_id)?;
    }
    discover_columns(selection, ctx, &node_id);
    graph.push_edge(Edge {
        id: ctx.ids.edge_id(),
        kind: EdgeKind::Flow,
        from: Endpoint::node(head),
        to: Endpoint::node(&node_id),
        label: None,
    });
    Ok(())
}

/// Puts the DML target table in scope so WHERE discovery and
/// correlation checks resolve against it.
fn seed_relation(ctx: &mut ConversionContext, table: &str, node_id: &str) {
    let columns = match ctx.catalog.get(table) {
        Some(schema) => schema
            .columns
            .iter()
            .map(|col| ColumnSchema {
                id: ctx.ids.column_id(),
                name: col.name.clone(),
                data_type: Some(col.data_type.clone()),
                source: ColumnSource::Relation(table.to_string()),
                table: Some(schema.name.clone()),
                source_node: Some(node_id.to_string()),
            })
            .collect(),
        None => Vec::new(),
    };
    ctx.state.relations.push(RelationState {
        name: table.to_string(),
        table: Some(table.to_string()),
        synthetic: false,
        columns,
    });
    ctx.register_alias(table, node_id);
}

fn table_name(table: &TableWithJoins) -> String {
    match &table.relation {
        TableFactor::Table { name, .. } => name.to_string(),
        other => other.to_string(),
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex(_) => "CREATE INDEX",
        Statement::AlterTable { .. } => "ALTER TABLE",
        _ => "unsupported statement",
    }
}
