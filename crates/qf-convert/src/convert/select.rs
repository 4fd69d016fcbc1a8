//! Query conversion: CTEs, SELECT pipelines, and set operations
//!
//! A query converts clause by clause in evaluation order: CTEs first,
//! then FROM and joins, WHERE, GROUP BY, HAVING, the projection, and
//! finally ORDER BY / LIMIT. Each clause appends a node, links it to
//! the previous one with a flow edge, and (for the schema-changing
//! clauses) records a snapshot of the state after the clause applied.

use qf_graph::{Edge, EdgeKind, Endpoint, Graph, Node, NodeKind};
use sqlparser::ast::{
    GroupByExpr, LimitClause, OrderByKind, Query, Select, SelectItem, SetExpr, SetOperator,
    SetQuantifier,
};

use crate::context::{ConversionContext, CteEntry};
use crate::convert::from::resolve_from;
use crate::convert::subquery::{collect_subqueries, convert_subquery};
use crate::error::ConvertResult;
use crate::print::{discover_columns, print_expr};
use crate::schema_flow::{self, SchemaState};

/// Converts a full query (CTEs, body, ORDER BY, LIMIT) into the graph.
/// Returns the id of the last node appended.
pub fn convert_query(
    query: &Query,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<Option<String>> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            convert_cte(cte, ctx, graph)?;
        }
    }

    let mut head = convert_set_expr(&query.body, ctx, graph)?;

    if let Some(order_by) = &query.order_by {
        if let OrderByKind::Expressions(exprs) = &order_by.kind {
            let sql = exprs
                .iter()
                .map(|o| {
                    let mut text = print_expr(&o.expr, ctx);
                    match o.options.asc {
                        Some(true) => text.push_str(" ASC"),
                        Some(false) => text.push_str(" DESC"),
                        None => {}
                    }
                    text
                })
                .collect::<Vec<_>>()
                .join(", ");
            let node_id = graph.push_node(
                Node::new(ctx.ids.node_id(), NodeKind::Clause, "ORDER BY").with_sql(sql),
            );
            flow_edge(ctx, graph, head.as_deref(), &node_id);
            head = Some(node_id);
        }
    }

    if let Some(limit_clause) = &query.limit_clause {
        let sql = match limit_clause {
            LimitClause::LimitOffset { limit, offset, .. } => {
                let mut parts = Vec::new();
                if let Some(limit) = limit {
                    parts.push(format!("LIMIT {}", print_expr(limit, ctx)));
                }
                if let Some(offset) = offset {
                    parts.push(format!("OFFSET {}", print_expr(&offset.value, ctx)));
                }
                parts.join(" ")
            }
            LimitClause::OffsetCommaLimit { offset, limit } => {
                format!(
                    "LIMIT {}, {}",
                    print_expr(offset, ctx),
                    print_expr(limit, ctx)
                )
            }
        };
        if !sql.is_empty() {
            let node_id = graph.push_node(
                Node::new(ctx.ids.node_id(), NodeKind::Clause, "LIMIT").with_sql(sql),
            );
            flow_edge(ctx, graph, head.as_deref(), &node_id);
            head = Some(node_id);
        }
    }

    Ok(head)
}

/// Converts one CTE definition in place, registering it for later FROM
/// references. The body shares the statement's graph and id namespace;
/// its terminal node gets a defines-edge to a named marker node.
fn convert_cte(
    cte: &sqlparser::ast::Cte,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<()> {
    let name = cte.alias.name.value.clone();

    // The body gets a clean scope; the statement's own FROM aliases and
    // state come later and must not see the CTE's internals.
    let saved_state = std::mem::take(&mut ctx.state);
    let saved_aliases = std::mem::take(&mut ctx.alias_nodes);
    let saved_from = std::mem::take(&mut ctx.from_aliases);

    let body_head = convert_query(&cte.query, ctx, graph)?;

    let mut columns = ctx.state.flat_columns();
    // Declared column aliases rename the exposed set positionally.
    for (idx, declared) in cte.alias.columns.iter().enumerate() {
        if let Some(col) = columns.get_mut(idx) {
            col.name = declared.name.value.clone();
        }
    }

    ctx.state = saved_state;
    ctx.alias_nodes = saved_aliases;
    ctx.from_aliases = saved_from;

    let marker_node = graph.push_node(Node::new(
        ctx.ids.node_id(),
        NodeKind::Relation,
        format!("CTE {name}"),
    ));
    if let Some(body_head) = body_head {
        graph.push_edge(Edge {
            id: ctx.ids.edge_id(),
            kind: EdgeKind::Defines,
            from: Endpoint::node(body_head),
            to: Endpoint::node(&marker_node),
            label: None,
        });
    }

    ctx.ctes
        .insert(name.to_lowercase(), CteEntry { marker_node, columns });
    Ok(())
}

fn convert_set_expr(
    body: &SetExpr,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<Option<String>> {
    match body {
        SetExpr::Select(select) => convert_select(select, ctx, graph),
        SetExpr::Query(inner) => convert_query(inner, ctx, graph),
        SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => {
            let left_head = convert_set_expr(left, ctx, graph)?;
            let left_state = std::mem::take(&mut ctx.state);

            let right_head = convert_set_expr(right, ctx, graph)?;
            let right_state = std::mem::take(&mut ctx.state);

            let label = set_op_label(op, set_quantifier);
            let node_id =
                graph.push_node(Node::new(ctx.ids.node_id(), NodeKind::Op, label));
            flow_edge(ctx, graph, left_head.as_deref(), &node_id);
            flow_edge(ctx, graph, right_head.as_deref(), &node_id);

            ctx.state =
                schema_flow::unioned(&left_state, &right_state, &mut ctx.ids, &node_id);
            graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
            Ok(Some(node_id))
        }
        SetExpr::Values(_) => {
            let node_id =
                graph.push_node(Node::new(ctx.ids.node_id(), NodeKind::Op, "VALUES"));
            ctx.state = SchemaState::empty();
            Ok(Some(node_id))
        }
        other => {
            log::warn!("Unsupported query body, skipping: {other}");
            Ok(None)
        }
    }
}

fn set_op_label(op: &SetOperator, quantifier: &SetQuantifier) -> String {
    let name = match op {
        SetOperator::Union => "UNION",
        SetOperator::Intersect => "INTERSECT",
        SetOperator::Except => "EXCEPT",
        SetOperator::Minus => "MINUS",
    };
    if matches!(quantifier, SetQuantifier::All) {
        format!("{name} ALL")
    } else {
        name.to_string()
    }
}

/// Converts one SELECT block in clause order.
fn convert_select(
    select: &Select,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
) -> ConvertResult<Option<String>> {
    ctx.state = SchemaState::empty();
    ctx.from_aliases.clear();
    let mut head = resolve_from(&select.from, ctx, graph)?;

    if let Some(selection) = &select.selection {
        let sql = print_expr(selection, ctx);
        let node_id = graph.push_node(
            Node::new(ctx.ids.node_id(), NodeKind::Clause, "WHERE").with_sql(sql),
        );
        for (sq_type, query) in collect_subqueries(selection) {
            convert_subquery(query, sq_type, ctx, graph, &node_id)?;
        }
        discover_columns(selection, ctx, &node_id);
        flow_edge(ctx, graph, head.as_deref(), &node_id);
        graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
        head = Some(node_id);
    }

    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        if !exprs.is_empty() {
            let sql = exprs
                .iter()
                .map(|e| print_expr(e, ctx))
                .collect::<Vec<_>>()
                .join(", ");
            let node_id = graph.push_node(
                Node::new(ctx.ids.node_id(), NodeKind::Clause, "GROUP BY").with_sql(sql),
            );
            ctx.state = schema_flow::grouped(&ctx.state, exprs, &mut ctx.ids, &node_id);
            flow_edge(ctx, graph, head.as_deref(), &node_id);
            graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
            head = Some(node_id);
        }
    }

    if let Some(having) = &select.having {
        let sql = print_expr(having, ctx);
        let node_id = graph.push_node(
            Node::new(ctx.ids.node_id(), NodeKind::Clause, "HAVING").with_sql(sql),
        );
        for (sq_type, query) in collect_subqueries(having) {
            convert_subquery(query, sq_type, ctx, graph, &node_id)?;
        }
        discover_columns(having, ctx, &node_id);
        flow_edge(ctx, graph, head.as_deref(), &node_id);
        head = Some(node_id);
    }

    let sql = select
        .projection
        .iter()
        .map(|item| print_select_item(item, ctx))
        .collect::<Vec<_>>()
        .join(", ");
    let node_id = graph.push_node(
        Node::new(ctx.ids.node_id(), NodeKind::Op, "SELECT").with_sql(sql),
    );
    for item in &select.projection {
        let expr = match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => expr,
            _ => continue,
        };
        for (sq_type, query) in collect_subqueries(expr) {
            convert_subquery(query, sq_type, ctx, graph, &node_id)?;
        }
    }
    ctx.state = schema_flow::projected(&ctx.state, &select.projection, &mut ctx.ids, &node_id);
    flow_edge(ctx, graph, head.as_deref(), &node_id);
    graph.push_snapshot(schema_flow::snapshot(&ctx.state, &node_id));
    Ok(Some(node_id))
}

fn print_select_item(item: &SelectItem, ctx: &mut ConversionContext) -> String {
    match item {
        SelectItem::UnnamedExpr(expr) => print_expr(expr, ctx),
        SelectItem::ExprWithAlias { expr, alias } => {
            format!("{} AS {}", print_expr(expr, ctx), alias)
        }
        SelectItem::Wildcard(_) => "*".to_string(),
        SelectItem::QualifiedWildcard(kind, _) => format!("{kind}.*"),
    }
}

fn flow_edge(
    ctx: &mut ConversionContext,
    graph: &mut Graph,
    from: Option<&str>,
    to: &str,
) {
    let Some(from) = from else {
        return;
    };
    graph.push_edge(Edge {
        id: ctx.ids.edge_id(),
        kind: EdgeKind::Flow,
        from: Endpoint::node(from),
        to: Endpoint::node(to),
        label: None,
    });
}
