//! FROM clause and join resolution
//!
//! The first relation in FROM becomes the graph's root node; every join
//! (explicit, or implicit via comma-separated FROM items) appends an
//! operator node and widens the schema state. A snapshot is recorded
//! after the root and after each join so the schema timeline shows how
//! scope builds up.

use qf_graph::{
    ColumnSchema, ColumnSource, Edge, EdgeKind, Endpoint, Graph, Node, NodeKind, SubqueryType,
};
use sqlparser::ast::{
    Expr, JoinConstraint, JoinOperator, TableFactor, TableWithJoins,
};

use crate::context::ConversionContext;
use crate::convert::subquery::{collect_subqueries, convert_subquery};
use crate::error::ConvertResult;
use crate::print::{discover_columns, print_expr};
use crate::schema_flow::{self, RelationState};

/// Resolves the whole FROM clause, returning the id of the last node
/// appended (the current flow head), or `None` when FROM is absent.
pub fn resolve_from(
    from: &[TableWithJoins],
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<Option<String>> {
    let Some(first) = from.first() else {
        return Ok(None);
    };

    let root_id = add_root(&first.relation, ctx, graph)?;
    let mut head = root_id;

    for join in &first.joins {
        head = add_join(
            join_type_label(&join.join_operator),
            &join.relation,
            join_constraint(&join.join_operator),
            &head,
            ctx,
            graph,
        )?;
    }

    // Comma-separated FROM items are implicit cross joins.
    for item in &from[1..] {
        head = add_join("CROSS", &item.relation, None, &head, ctx, graph)?;
        for join in &item.joins {
            head = add_join(
                join_type_label(&join.join_operator),
                &join.relation,
                join_constraint(&join.join_operator),
                &head,
                ctx,
                graph,
            )?;
        }
    }

    Ok(Some(head))
}

fn add_root(
    factor: &TableFactor,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<String> {
    let node_id = graph.push_node(Node::new(
        ctx.ids.node_id(),
        NodeKind::Relation,
        format!("FROM {}", factor_label(factor)),
    ));
    let relation = resolve_factor(factor, ctx, graph, &node_id)?;
    ctx.register_alias(&relation.name, &node_id);
    ctx.state = schema_flow::with_relation(&ctx.state, relation);
    graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
    Ok(node_id)
}

fn add_join(
    join_type: &str,
    factor: &TableFactor,
    constraint: Option<&JoinConstraint>,
    head: &str,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<String> {
    let mut node = Node::new(
        ctx.ids.node_id(),
        NodeKind::Op,
        format!("{join_type} JOIN {}", factor_label(factor)),
    );
    let node_id = node.id.clone();

    let relation = resolve_factor(factor, ctx, graph, &node_id)?;
    ctx.register_alias(&relation.name, &node_id);
    ctx.state = schema_flow::with_relation(&ctx.state, relation);

    if let Some(sql) = constraint_sql(constraint, ctx) {
        node = node.with_sql(sql);
    }
    graph.push_node(node);

    if let Some(JoinConstraint::On(on)) = constraint {
        for (sq_type, query) in collect_subqueries(on) {
            convert_subquery(query, sq_type, ctx, graph, &node_id)?;
        }
        discover_columns(on, ctx, &node_id);
    }

    graph.push_edge(Edge {
        id: ctx.ids.edge_id(),
        kind: EdgeKind::Flow,
        from: Endpoint::node(head),
        to: Endpoint::node(&node_id),
        label: None,
    });
    graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
    Ok(node_id)
}

/// Builds the schema-state entry for one table factor. CTE references
/// reuse the registered column set and draw a uses-edge back to the CTE
/// marker; declared tables pull their columns from the catalog; derived
/// tables convert as scalar subqueries and expose their result columns
/// under the alias.
fn resolve_factor(
    factor: &TableFactor,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
    node_id: &str,
) -> ConvertResult<RelationState> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let full_name = name.to_string();
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| last_name_part(name));

            if let Some(cte) = ctx.ctes.get(&full_name.to_lowercase()).cloned() {
                graph.push_edge(Edge {
                    id: ctx.ids.edge_id(),
                    kind: EdgeKind::Uses,
                    from: Endpoint::node(&cte.marker_node),
                    to: Endpoint::node(node_id),
                    label: None,
                });
                let columns = rebind_columns(cte.columns, &alias_name, ctx, node_id);
                return Ok(RelationState {
                    name: alias_name,
                    table: None,
                    synthetic: false,
                    columns,
                });
            }

            let schema = ctx
                .catalog
                .get(&full_name)
                .or_else(|| ctx.catalog.get(&last_name_part(name)));
            match schema {
                Some(table) => {
                    let table_name = table.name.clone();
                    let columns = table
                        .columns
                        .iter()
                        .map(|col| ColumnSchema {
                            id: ctx.ids.column_id(),
                            name: col.name.clone(),
                            data_type: Some(col.data_type.clone()),
                            source: ColumnSource::Relation(alias_name.clone()),
                            table: Some(table_name.clone()),
                            source_node: Some(node_id.to_string()),
                        })
                        .collect();
                    Ok(RelationState {
                        name: alias_name,
                        table: Some(table_name),
                        synthetic: false,
                        columns,
                    })
                }
                None => {
                    // Undeclared table: columns fill in later via discovery.
                    Ok(RelationState {
                        name: alias_name,
                        table: Some(full_name),
                        synthetic: false,
                        columns: Vec::new(),
                    })
                }
            }
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| "derived".to_string());
            let sq_id = convert_subquery(subquery, SubqueryType::Scalar, ctx, graph, node_id)?;

            let inner_columns = graph
                .node(&sq_id)
                .and_then(|n| n.subquery.as_ref())
                .and_then(|info| info.inner_graph.snapshots.last())
                .map(|snap| snap.schema.columns.clone())
                .unwrap_or_default();
            let columns = rebind_columns(inner_columns, &alias_name, ctx, node_id);
            Ok(RelationState {
                name: alias_name,
                table: None,
                synthetic: false,
                columns,
            })
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => resolve_factor(&table_with_joins.relation, ctx, graph, node_id),
        other => {
            log::warn!("Unsupported table factor, treating as opaque relation: {other}");
            Ok(RelationState {
                name: factor_label(other),
                table: None,
                synthetic: false,
                columns: Vec::new(),
            })
        }
    }
}

/// Clones captured columns into the current scope under a new alias.
fn rebind_columns(
    columns: Vec<ColumnSchema>,
    alias: &str,
    ctx: &mut ConversionContext,
    node_id: &str,
) -> Vec<ColumnSchema> {
    columns
        .into_iter()
        .map(|col| ColumnSchema {
            id: ctx.ids.column_id(),
            name: col.name,
            data_type: col.data_type,
            source: ColumnSource::Relation(alias.to_string()),
            table: col.table,
            source_node: Some(node_id.to_string()),
        })
        .collect()
}

fn constraint_sql(constraint: Option<&JoinConstraint>, ctx: &mut ConversionContext) -> Option<String> {
    match constraint? {
        JoinConstraint::On(expr) => Some(print_expr(expr, ctx)),
        JoinConstraint::Using(columns) => {
            let list = columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("USING ({list})"))
        }
        JoinConstraint::Natural | JoinConstraint::None => None,
    }
}

fn factor_label(factor: &TableFactor) -> String {
    match factor {
        TableFactor::Table { name, alias, .. } => match alias {
            Some(alias) => format!("{name} {}", alias.name.value),
            None => name.to_string(),
        },
        TableFactor::Derived { alias, .. } => match alias {
            Some(alias) => format!("(subquery) {}", alias.name.value),
            None => "(subquery)".to_string(),
        },
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => factor_label(&table_with_joins.relation),
        other => other.to_string(),
    }
}

fn last_name_part(name: &sqlparser::ast::ObjectName) -> String {
    name.0
        .last()
        .and_then(|p| p.as_ident())
        .map(|i| i.value.clone())
        .unwrap_or_else(|| name.to_string())
}

fn join_type_label(op: &JoinOperator) -> &'static str {
    match op {
        JoinOperator::Join(_) | JoinOperator::Inner(_) => "INNER",
        JoinOperator::Left(_) | JoinOperator::LeftOuter(_) => "LEFT",
        JoinOperator::Right(_) | JoinOperator::RightOuter(_) => "RIGHT",
        JoinOperator::FullOuter(_) => "FULL",
        JoinOperator::CrossJoin(_) => "CROSS",
        other => {
            log::warn!("Unrecognized join operator {other:?}, treating as INNER");
            "INNER"
        }
    }
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Join(c)
        | JoinOperator::Inner(c)
        | JoinOperator::Left(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::Right(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::CrossJoin(c) => Some(c),
        _ => None,
    }
}

/// The ON expression of a join, when the constraint has one.
pub(crate) fn join_on_expr(op: &JoinOperator) -> Option<&Expr> {
    match join_constraint(op) {
        Some(JoinConstraint::On(expr)) => Some(expr),
        _ => None,
    }
}
