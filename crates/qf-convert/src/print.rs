//! Expression printing and column discovery
//!
//! [`print_expr`] renders expression ASTs into the SQL-like text that
//! node labels carry. It never fails: shapes it does not recognize fall
//! back to the AST's own `Display` output, and subquery operands print
//! as a stable placeholder token (`expr`, `expr2`, ...) so the label
//! matches the subquery-result edge drawn for the same subquery.
//!
//! [`discover_columns`] is the companion walk that synthesizes untyped
//! schema entries for column references WHERE/ON/HAVING mention but no
//! `CREATE TABLE` declared.

use qf_graph::{ColumnSchema, ColumnSource};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Value,
};

use crate::context::ConversionContext;

/// Renders an expression for display.
pub fn print_expr(expr: &Expr, ctx: &mut ConversionContext) -> String {
    match expr {
        Expr::Identifier(ident) => ident.to_string(),
        Expr::CompoundIdentifier(parts) => parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("."),
        Expr::Value(value) => print_value(&value.value),
        Expr::BinaryOp { left, op, right } => {
            format!("{} {} {}", print_expr(left, ctx), op, print_expr(right, ctx))
        }
        Expr::UnaryOp { op, expr } => format!("{}{}", op, print_expr(expr, ctx)),
        Expr::Nested(inner) => format!("({})", print_expr(inner, ctx)),
        Expr::IsNull(inner) => format!("{} IS NULL", print_expr(inner, ctx)),
        Expr::IsNotNull(inner) => format!("{} IS NOT NULL", print_expr(inner, ctx)),
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => format!(
            "{}{} BETWEEN {} AND {}",
            print_expr(expr, ctx),
            if *negated { " NOT" } else { "" },
            print_expr(low, ctx),
            print_expr(high, ctx)
        ),
        Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => format!(
            "{}{} LIKE {}",
            print_expr(expr, ctx),
            if *negated { " NOT" } else { "" },
            print_expr(pattern, ctx)
        ),
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let items = list
                .iter()
                .map(|item| print_expr(item, ctx))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{}{} IN ({})",
                print_expr(expr, ctx),
                if *negated { " NOT" } else { "" },
                items
            )
        }
        Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            let token = ctx.placeholder_for(&subquery.to_string());
            format!(
                "{}{} IN {}",
                print_expr(expr, ctx),
                if *negated { " NOT" } else { "" },
                token
            )
        }
        Expr::Exists { subquery, negated } => {
            let token = ctx.placeholder_for(&subquery.to_string());
            format!("{}EXISTS {}", if *negated { "NOT " } else { "" }, token)
        }
        Expr::Subquery(subquery) => ctx.placeholder_for(&subquery.to_string()),
        Expr::Function(func) => print_function(func, ctx),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            let mut out = String::from("CASE");
            if let Some(operand) = operand {
                out.push(' ');
                out.push_str(&print_expr(operand, ctx));
            }
            for when in conditions {
                out.push_str(&format!(
                    " WHEN {} THEN {}",
                    print_expr(&when.condition, ctx),
                    print_expr(&when.result, ctx)
                ));
            }
            if let Some(else_result) = else_result {
                out.push_str(&format!(" ELSE {}", print_expr(else_result, ctx)));
            }
            out.push_str(" END");
            out
        }
        Expr::Cast {
            expr, data_type, ..
        } => format!("CAST({} AS {})", print_expr(expr, ctx), data_type),
        // Anything else renders through the AST's own Display. That keeps
        // printing total; the label is just less curated.
        other => other.to_string(),
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Number(n, _) => n.clone(),
        Value::SingleQuotedString(s) => format!("'{s}'"),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn print_function(func: &sqlparser::ast::Function, ctx: &mut ConversionContext) -> String {
    let name = func.name.to_string();
    let args = match &func.args {
        FunctionArguments::None => String::new(),
        FunctionArguments::Subquery(query) => ctx.placeholder_for(&query.to_string()),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| print_function_arg(arg, ctx))
            .collect::<Vec<_>>()
            .join(", "),
    };
    format!("{name}({args})")
}

fn print_function_arg(arg: &FunctionArg, ctx: &mut ConversionContext) -> String {
    let arg_expr = match arg {
        FunctionArg::Named { arg, .. } => arg,
        FunctionArg::Unnamed(arg) => arg,
        FunctionArg::ExprNamed { arg, .. } => arg,
    };
    match arg_expr {
        FunctionArgExpr::Expr(expr) => print_expr(expr, ctx),
        FunctionArgExpr::Wildcard => "*".to_string(),
        FunctionArgExpr::QualifiedWildcard(name) => format!("{name}.*"),
    }
}

/// Walks column references in an expression and registers any that are
/// missing from the current scope as untyped columns.
///
/// Qualified refs attach to the named relation; bare refs attach to the
/// sole non-synthetic relation when there is exactly one, otherwise they
/// are left alone (an ambiguous ref is not evidence of a new column).
/// Subquery interiors are skipped; their own conversion handles them.
pub fn discover_columns(expr: &Expr, ctx: &mut ConversionContext, node_id: &str) {
    match expr {
        Expr::Identifier(ident) => {
            if ctx.state.column_exists(None, &ident.value) {
                return;
            }
            let column = untyped(ctx, None, &ident.value, node_id);
            if let Some(rel) = ctx.state.sole_relation_mut() {
                rel.columns.push(column);
            }
        }
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let qualifier = parts[parts.len() - 2].value.clone();
            let name = parts[parts.len() - 1].value.clone();
            if ctx.state.column_exists(Some(&qualifier), &name) {
                return;
            }
            if ctx.state.relation(&qualifier).is_none() {
                return;
            }
            let mut column = untyped(ctx, Some(&qualifier), &name, node_id);
            column.table = ctx
                .state
                .relation(&qualifier)
                .and_then(|r| r.table.clone());
            if let Some(rel) = ctx.state.relation_mut(&qualifier) {
                rel.columns.push(column);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            discover_columns(left, ctx, node_id);
            discover_columns(right, ctx, node_id);
        }
        Expr::UnaryOp { expr, .. } => discover_columns(expr, ctx, node_id),
        Expr::Nested(inner) => discover_columns(inner, ctx, node_id),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => discover_columns(inner, ctx, node_id),
        Expr::Between {
            expr, low, high, ..
        } => {
            discover_columns(expr, ctx, node_id);
            discover_columns(low, ctx, node_id);
            discover_columns(high, ctx, node_id);
        }
        Expr::Like { expr, pattern, .. } => {
            discover_columns(expr, ctx, node_id);
            discover_columns(pattern, ctx, node_id);
        }
        Expr::InList { expr, list, .. } => {
            discover_columns(expr, ctx, node_id);
            for item in list {
                discover_columns(item, ctx, node_id);
            }
        }
        // The comparison side of an IN subquery is outer-scope; the
        // subquery body is not.
        Expr::InSubquery { expr, .. } => discover_columns(expr, ctx, node_id),
        Expr::Exists { .. } | Expr::Subquery(_) => {}
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &func.args {
                for arg in &list.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. } => arg,
                        FunctionArg::Unnamed(arg) => arg,
                        FunctionArg::ExprNamed { arg, .. } => arg,
                    };
                    if let FunctionArgExpr::Expr(expr) = arg_expr {
                        discover_columns(expr, ctx, node_id);
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
                discover_columns(operand, ctx, node_id);
            }
            for when in conditions {
                discover_columns(&when.condition, ctx, node_id);
                discover_columns(&when.result, ctx, node_id);
            }
            if let Some(else_result) = else_result {
                discover_columns(else_result, ctx, node_id);
            }
        }
        Expr::Cast { expr, .. } => discover_columns(expr, ctx, node_id),
        _ => {}
    }
}

fn untyped(
    ctx: &mut ConversionContext,
    qualifier: Option<&str>,
    name: &str,
    node_id: &str,
) -> ColumnSchema {
    let source = match qualifier {
        Some(q) => ColumnSource::Relation(q.to_string()),
        None => ctx
            .state
            .relations
            .iter()
            .find(|r| !r.synthetic)
            .map(|r| ColumnSource::Relation(r.name.clone()))
            .unwrap_or(ColumnSource::Unknown),
    };
    ColumnSchema {
        id: ctx.ids.column_id(),
        name: name.to_string(),
        data_type: None,
        source,
        table: None,
        source_node: Some(node_id.to_string()),
    }
}

#[cfg(test)]
#[path = "print_test.rs"]
mod tests;
