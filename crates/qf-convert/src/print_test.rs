use qf_graph::ColumnSource;
use sqlparser::ast::{Expr, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::*;
use crate::catalog::TableCatalog;
use crate::schema_flow::RelationState;

fn parse_where(sql: &str) -> Expr {
    let full = format!("SELECT 1 FROM t WHERE {sql}");
    let statements = Parser::parse_sql(&GenericDialect {}, &full).unwrap();
    match statements.into_iter().next().unwrap() {
        Statement::Query(query) => match *query.body {
            SetExpr::Select(select) => select.selection.unwrap(),
            other => panic!("expected SELECT, got {other:?}"),
        },
        other => panic!("expected query, got {other:?}"),
    }
}

fn ctx_with_relation<'a>(catalog: &'a TableCatalog, alias: &str) -> ConversionContext<'a> {
    let mut ctx = ConversionContext::new(catalog);
    ctx.state.relations.push(RelationState {
        name: alias.to_string(),
        table: Some(alias.to_string()),
        synthetic: false,
        columns: Vec::new(),
    });
    ctx
}

#[test]
fn prints_comparisons_and_literals() {
    let catalog = TableCatalog::default();
    let mut ctx = ConversionContext::new(&catalog);
    let expr = parse_where("age >= 18 AND name = 'bob'");
    assert_eq!(print_expr(&expr, &mut ctx), "age >= 18 AND name = 'bob'");
}

#[test]
fn prints_between_and_in_list() {
    let catalog = TableCatalog::default();
    let mut ctx = ConversionContext::new(&catalog);

    let expr = parse_where("price BETWEEN 10 AND 20");
    assert_eq!(print_expr(&expr, &mut ctx), "price BETWEEN 10 AND 20");

    let expr = parse_where("status NOT IN ('a', 'b')");
    assert_eq!(print_expr(&expr, &mut ctx), "status NOT IN ('a', 'b')");
}

#[test]
fn prints_case_expression() {
    let catalog = TableCatalog::default();
    let mut ctx = ConversionContext::new(&catalog);
    let expr = parse_where("CASE WHEN x > 0 THEN 'pos' ELSE 'neg' END = 'pos'");
    assert_eq!(
        print_expr(&expr, &mut ctx),
        "CASE WHEN x > 0 THEN 'pos' ELSE 'neg' END = 'pos'"
    );
}

#[test]
fn subqueries_print_as_stable_placeholders() {
    let catalog = TableCatalog::default();
    let mut ctx = ConversionContext::new(&catalog);

    let first = parse_where("id IN (SELECT id FROM banned)");
    assert_eq!(print_expr(&first, &mut ctx), "id IN expr");

    // The same subquery text reuses the token; a different one advances it.
    let again = parse_where("id IN (SELECT id FROM banned)");
    assert_eq!(print_expr(&again, &mut ctx), "id IN expr");

    let other = parse_where("EXISTS (SELECT 1 FROM audit)");
    assert_eq!(print_expr(&other, &mut ctx), "EXISTS expr2");
}

#[test]
fn prints_function_calls() {
    let catalog = TableCatalog::default();
    let mut ctx = ConversionContext::new(&catalog);
    let expr = parse_where("COALESCE(nickname, name) = 'x'");
    assert_eq!(
        print_expr(&expr, &mut ctx),
        "COALESCE(nickname, name) = 'x'"
    );
}

#[test]
fn discovery_adds_untyped_columns_to_scope() {
    let catalog = TableCatalog::default();
    let mut ctx = ctx_with_relation(&catalog, "orders");
    let expr = parse_where("orders.total > 100 AND region = 'eu'");

    discover_columns(&expr, &mut ctx, "n1");

    let rel = ctx.state.relation("orders").unwrap();
    let names: Vec<_> = rel.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["total", "region"]);
    assert!(rel.columns.iter().all(|c| c.is_untyped()));
    assert_eq!(
        rel.columns[0].source,
        ColumnSource::Relation("orders".to_string())
    );
}

#[test]
fn discovery_skips_known_columns_and_subquery_interiors() {
    let catalog = TableCatalog::default();
    let mut ctx = ctx_with_relation(&catalog, "orders");
    let expr = parse_where("total > 1");
    discover_columns(&expr, &mut ctx, "n1");
    discover_columns(&expr, &mut ctx, "n1");
    assert_eq!(ctx.state.relation("orders").unwrap().columns.len(), 1);

    let expr = parse_where("EXISTS (SELECT secret FROM vault)");
    discover_columns(&expr, &mut ctx, "n1");
    assert_eq!(ctx.state.relation("orders").unwrap().columns.len(), 1);
}
