//! Subquery expansion and correlation analysis
//!
//! Scalar, `IN`, and `EXISTS` subqueries each become a subquery node in
//! the enclosing graph. The node carries a fully converted inner graph
//! (own id namespace, own snapshots) plus the list of outer columns the
//! subquery correlates on. Edges tie the node back to the clause that
//! consumes it and to the FROM/JOIN nodes that introduced the aliases it
//! references.

use std::collections::BTreeSet;

use qf_graph::{Edge, EdgeKind, Endpoint, Graph, Node, NodeKind, SubqueryInfo, SubqueryType};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Query, SetExpr, TableFactor,
};

use crate::context::ConversionContext;
use crate::convert::select::convert_query;
use crate::error::ConvertResult;

/// Finds every subquery nested in an expression, in source order.
pub fn collect_subqueries<'ast>(expr: &'ast Expr) -> Vec<(SubqueryType, &'ast Query)> {
    let mut found = Vec::new();
    walk(expr, &mut found);
    found
}

fn walk<'ast>(expr: &'ast Expr, out: &mut Vec<(SubqueryType, &'ast Query)>) {
    match expr {
        Expr::Subquery(query) => out.push((SubqueryType::Scalar, query)),
        Expr::InSubquery { expr, subquery, .. } => {
            walk(expr, out);
            out.push((SubqueryType::In, subquery));
        }
        Expr::Exists { subquery, .. } => out.push((SubqueryType::Exists, subquery)),
        Expr::BinaryOp { left, right, .. } => {
            walk(left, out);
            walk(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            walk(expr, out)
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => walk(inner, out),
        Expr::Between {
            expr, low, high, ..
        } => {
            walk(expr, out);
            walk(low, out);
            walk(high, out);
        }
        Expr::Like { expr, pattern, .. } => {
            walk(expr, out);
            walk(pattern, out);
        }
        Expr::InList { expr, list, .. } => {
            walk(expr, out);
            for item in list {
                walk(item, out);
            }
        }
        Expr::Function(func) => match &func.args {
            FunctionArguments::Subquery(query) => out.push((SubqueryType::Scalar, query)),
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. } => arg,
                        FunctionArg::Unnamed(arg) => arg,
                        FunctionArg::ExprNamed { arg, .. } => arg,
                    };
                    if let FunctionArgExpr::Expr(expr) = arg_expr {
                        walk(expr, out);
                    }
                }
            }
            FunctionArguments::None => {}
        },
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                walk(operand, out);
            }
            for when in conditions {
                walk(&when.condition, out);
                walk(&when.result, out);
            }
            if let Some(else_result) = else_result {
                walk(else_result, out);
            }
        }
        _ => {}
    }
}

/// Converts one subquery and wires it into the enclosing graph.
///
/// Returns the id of the subquery node. The subquery-result edge to the
/// consuming clause carries the same placeholder token the printer used
/// for this subquery, so labels line up across the graph.
pub fn convert_subquery(
    query: &Query,
    sq_type: SubqueryType,
    ctx: &mut ConversionContext,
    graph: &mut Graph,
    consumer_node: &str,
) -> ConvertResult<String> {
    let mut child = ctx.child();
    let mut inner = Graph::default();
    convert_query(query, &mut child, &mut inner)?;

    let correlated = correlated_fields(query, ctx);

    let node_id = graph.push_node(Node {
        id: ctx.ids.node_id(),
        kind: NodeKind::Subquery,
        label: format!("{} subquery", sq_type),
        sql: Some(query.to_string()),
        subquery: Some(SubqueryInfo {
            subquery_type: sq_type,
            inner_graph: inner,
            correlated_fields: correlated.iter().map(|(a, c)| format!("{a}.{c}")).collect(),
        }),
    });

    let token = ctx.placeholder_for(&query.to_string());
    graph.push_edge(Edge {
        id: ctx.ids.edge_id(),
        kind: EdgeKind::SubqueryResult,
        from: Endpoint::node(&node_id),
        to: Endpoint::node(consumer_node),
        label: Some(token),
    });

    for (alias, column) in &correlated {
        if let Some(outer_node) = ctx.alias_nodes.get(&alias.to_lowercase()).cloned() {
            graph.push_edge(Edge {
                id: ctx.ids.edge_id(),
                kind: EdgeKind::Correlation,
                from: Endpoint::node(&node_id),
                to: Endpoint::node(&outer_node),
                label: Some(format!("{alias}.{column}")),
            });
        }
    }

    Ok(node_id)
}

/// Qualified refs inside the subquery whose qualifier names an outer
/// FROM alias rather than anything the subquery itself brings into
/// scope. Checked against the context's alias set, not the schema
/// state: a HAVING subquery runs after the GROUP BY collapse has
/// replaced the FROM relations, but the aliases still correlate.
fn correlated_fields(query: &Query, outer: &ConversionContext) -> BTreeSet<(String, String)> {
    let mut refs = BTreeSet::new();
    let mut local_aliases = BTreeSet::new();
    scan_query(query, &mut refs, &mut local_aliases);

    refs.into_iter()
        .filter(|(alias, _)| {
            let lower = alias.to_lowercase();
            !local_aliases.contains(&lower) && outer.from_aliases.contains(&lower)
        })
        .collect()
}

fn scan_query(
    query: &Query,
    refs: &mut BTreeSet<(String, String)>,
    local_aliases: &mut BTreeSet<String>,
) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            local_aliases.insert(cte.alias.name.value.to_lowercase());
        }
    }
    scan_set_expr(&query.body, refs, local_aliases);
}

fn scan_set_expr(
    body: &SetExpr,
    refs: &mut BTreeSet<(String, String)>,
    local_aliases: &mut BTreeSet<String>,
) {
    match body {
        SetExpr::Select(select) => {
            for twj in &select.from {
                scan_factor(&twj.relation, refs, local_aliases);
                for join in &twj.joins {
                    scan_factor(&join.relation, refs, local_aliases);
                    if let Some(on) = crate::convert::from::join_on_expr(&join.join_operator) {
                        scan_expr(on, refs);
                    }
                }
            }
            for item in &select.projection {
                match item {
                    sqlparser::ast::SelectItem::UnnamedExpr(expr)
                    | sqlparser::ast::SelectItem::ExprWithAlias { expr, .. } => {
                        scan_expr(expr, refs)
                    }
                    _ => {}
                }
            }
            if let Some(selection) = &select.selection {
                scan_expr(selection, refs);
            }
            if let Some(having) = &select.having {
                scan_expr(having, refs);
            }
        }
        SetExpr::Query(inner) => scan_query(inner, refs, local_aliases),
        SetExpr::SetOperation { left, right, .. } => {
            scan_set_expr(left, refs, local_aliases);
            scan_set_expr(right, refs, local_aliases);
        }
        _ => {}
    }
}

fn scan_factor(
    factor: &TableFactor,
    refs: &mut BTreeSet<(String, String)>,
    local_aliases: &mut BTreeSet<String>,
) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let alias_name = match alias {
                Some(a) => a.name.value.clone(),
                None => name
                    .0
                    .last()
                    .and_then(|p| p.as_ident())
                    .map(|i| i.value.clone())
                    .unwrap_or_else(|| name.to_string()),
            };
            local_aliases.insert(alias_name.to_lowercase());
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            if let Some(alias) = alias {
                local_aliases.insert(alias.name.value.to_lowercase());
            }
            scan_query(subquery, refs, local_aliases);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            scan_factor(&table_with_joins.relation, refs, local_aliases);
            for join in &table_with_joins.joins {
                scan_factor(&join.relation, refs, local_aliases);
            }
        }
        _ => {}
    }
}

fn scan_expr(expr: &Expr, refs: &mut BTreeSet<(String, String)>) {
    match expr {
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            refs.insert((
                parts[parts.len() - 2].value.clone(),
                parts[parts.len() - 1].value.clone(),
            ));
        }
        Expr::BinaryOp { left, right, .. } => {
            scan_expr(left, refs);
            scan_expr(right, refs);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            scan_expr(expr, refs)
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => scan_expr(inner, refs),
        Expr::Between {
            expr, low, high, ..
        } => {
            scan_expr(expr, refs);
            scan_expr(low, refs);
            scan_expr(high, refs);
        }
        Expr::Like { expr, pattern, .. } => {
            scan_expr(expr, refs);
            scan_expr(pattern, refs);
        }
        Expr::InList { expr, list, .. } => {
            scan_expr(expr, refs);
            for item in list {
                scan_expr(item, refs);
            }
        }
        Expr::InSubquery { expr, .. } => scan_expr(expr, refs),
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &func.args {
                for arg in &list.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. } => arg,
                        FunctionArg::Unnamed(arg) => arg,
                        FunctionArg::ExprNamed { arg, .. } => arg,
                    };
                    if let FunctionArgExpr::Expr(expr) = arg_expr {
                        scan_expr(expr, refs);
                    }
                }
            }
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                scan_expr(operand, refs);
            }
            for when in conditions {
                scan_expr(&when.condition, refs);
                scan_expr(&when.result, refs);
            }
            if let Some(else_result) = else_result {
                scan_expr(else_result, refs);
            }
        }
        _ => {}
    }
}
