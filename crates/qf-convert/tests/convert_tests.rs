//! End-to-end conversion tests: SQL text in, flow graphs out.

use qf_convert::{convert_script, convert_statement, ConvertError, TableCatalog};
use qf_graph::{ColumnSource, EdgeKind, Graph, NodeKind};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

fn parse(sql: &str) -> Vec<Statement> {
    Parser::parse_sql(&GenericDialect {}, sql).unwrap()
}

fn convert_one(sql: &str) -> Graph {
    let statements = parse(sql);
    let mut graphs = convert_script(&statements).unwrap();
    assert_eq!(graphs.len(), 1, "expected exactly one graph for: {sql}");
    graphs.remove(0)
}

const TWO_TABLES: &str = "
    CREATE TABLE users (id INT, name TEXT);
    CREATE TABLE orders (id INT, total DECIMAL(10,2), user_id INT);
";

#[test]
fn simple_select_is_from_then_select() {
    let graph = convert_one("CREATE TABLE users (id INT, name TEXT); SELECT id, name FROM users");

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.nodes[0].kind, NodeKind::Relation);
    assert_eq!(graph.nodes[0].label, "FROM users");
    assert_eq!(graph.nodes[1].kind, NodeKind::Op);
    assert_eq!(graph.nodes[1].label, "SELECT");
    assert_eq!(graph.nodes[1].sql.as_deref(), Some("id, name"));

    let flows: Vec<_> = graph.edges_of_kind(EdgeKind::Flow).collect();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].from.node, graph.nodes[0].id);
    assert_eq!(flows[0].to.node, graph.nodes[1].id);
}

#[test]
fn where_clause_sits_between_from_and_select() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT); SELECT name FROM users WHERE id > 10",
    );

    let labels: Vec<_> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["FROM users", "WHERE", "SELECT"]);
    assert_eq!(graph.nodes[1].kind, NodeKind::Clause);
    assert_eq!(graph.nodes[1].sql.as_deref(), Some("id > 10"));

    let flows: Vec<_> = graph.edges_of_kind(EdgeKind::Flow).collect();
    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0].from.node, graph.nodes[0].id);
    assert_eq!(flows[0].to.node, graph.nodes[1].id);
    assert_eq!(flows[1].from.node, graph.nodes[1].id);
    assert_eq!(flows[1].to.node, graph.nodes[2].id);
}

#[test]
fn join_snapshot_unions_both_relations() {
    let sql = format!(
        "{TWO_TABLES} SELECT * FROM users u JOIN orders o ON u.id = o.user_id"
    );
    let graph = convert_one(&sql);

    let join = graph
        .nodes
        .iter()
        .find(|n| n.label == "INNER JOIN orders o")
        .unwrap();
    assert_eq!(join.sql.as_deref(), Some("u.id = o.user_id"));

    let snapshot = graph.snapshot_for(&join.id).unwrap();
    let names: Vec<_> = snapshot
        .schema
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["id", "name", "id", "total", "user_id"]);
}

#[test]
fn wildcard_after_join_projects_all_columns_with_sources() {
    let sql = format!(
        "{TWO_TABLES} SELECT * FROM users u JOIN orders o ON u.id = o.user_id"
    );
    let graph = convert_one(&sql);

    let select = graph.nodes.iter().find(|n| n.label == "SELECT").unwrap();
    let result = graph.snapshot_for(&select.id).unwrap();
    assert_eq!(result.schema.columns.len(), 5);
    let sources: Vec<_> = result
        .schema
        .columns
        .iter()
        .map(|c| c.source.as_str())
        .collect();
    assert_eq!(sources, vec!["u", "u", "o", "o", "o"]);
}

#[test]
fn join_against_undeclared_table_backfills_from_on_clause() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         SELECT * FROM users u JOIN mystery m ON u.id = m.user_ref",
    );

    let join = graph
        .nodes
        .iter()
        .find(|n| n.label.starts_with("INNER JOIN"))
        .unwrap();
    let snapshot = graph.snapshot_for(&join.id).unwrap();
    let backfilled = snapshot
        .schema
        .columns
        .iter()
        .find(|c| c.name == "user_ref")
        .unwrap();
    assert_eq!(backfilled.source, ColumnSource::Relation("m".to_string()));
    assert!(backfilled.is_untyped());
}

#[test]
fn where_discovers_columns_missing_from_ddl() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT); SELECT id FROM users WHERE region = 'eu'",
    );

    let where_node = graph.nodes.iter().find(|n| n.label == "WHERE").unwrap();
    let snapshot = graph.snapshot_for(&where_node.id).unwrap();
    let region = snapshot
        .schema
        .columns
        .iter()
        .find(|c| c.name == "region")
        .unwrap();
    assert!(region.is_untyped());
    assert_eq!(region.source_node.as_deref(), Some(where_node.id.as_str()));
}

#[test]
fn group_by_collapses_then_select_projects_aggregates() {
    let graph = convert_one(
        "CREATE TABLE payments (region TEXT, amount DECIMAL(10,2));
         SELECT region, SUM(amount) AS total FROM payments GROUP BY region",
    );

    let labels: Vec<_> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["FROM payments", "GROUP BY", "SELECT"]);

    let group = &graph.nodes[1];
    let grouped = graph.snapshot_for(&group.id).unwrap();
    assert_eq!(grouped.schema.columns.len(), 1);
    assert_eq!(grouped.schema.columns[0].name, "region");
    assert_eq!(grouped.schema.columns[0].data_type.as_deref(), Some("text"));

    let select = &graph.nodes[2];
    let result = graph.snapshot_for(&select.id).unwrap();
    assert_eq!(result.schema.columns.len(), 2);
    assert_eq!(result.schema.columns[0].name, "region");
    assert_eq!(result.schema.columns[1].name, "total");
    assert_eq!(result.schema.columns[1].source, ColumnSource::Aggregate);
    assert_eq!(
        result.schema.columns[1].data_type.as_deref(),
        Some("numeric")
    );
}

#[test]
fn order_by_and_limit_append_clause_nodes_without_snapshots() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         SELECT id FROM users ORDER BY id DESC LIMIT 10 OFFSET 5",
    );

    let labels: Vec<_> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, vec!["FROM users", "SELECT", "ORDER BY", "LIMIT"]);
    assert_eq!(graph.nodes[2].sql.as_deref(), Some("id DESC"));
    assert_eq!(graph.nodes[3].sql.as_deref(), Some("LIMIT 10 OFFSET 5"));

    // Only FROM and SELECT change the schema.
    assert_eq!(graph.snapshots.len(), 2);
    assert_eq!(
        graph.terminal_node().map(|n| n.label.as_str()),
        Some("LIMIT")
    );
}

#[test]
fn union_merges_branch_schemas() {
    let graph = convert_one(
        "CREATE TABLE a (x INT); CREATE TABLE b (y INT);
         SELECT x FROM a UNION ALL SELECT y FROM b",
    );

    let union = graph.nodes.iter().find(|n| n.label == "UNION ALL").unwrap();
    let incoming: Vec<_> = graph
        .edges_of_kind(EdgeKind::Flow)
        .filter(|e| e.to.node == union.id)
        .collect();
    assert_eq!(incoming.len(), 2);

    let merged = graph.snapshot_for(&union.id).unwrap();
    let names: Vec<_> = merged
        .schema
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["x", "y"]);
}

#[test]
fn cte_defines_and_uses_edges_carry_schema() {
    let graph = convert_one(
        "CREATE TABLE raw_events (id INT, kind TEXT);
         WITH recent AS (SELECT id, kind FROM raw_events) SELECT id FROM recent",
    );

    let marker = graph.nodes.iter().find(|n| n.label == "CTE recent").unwrap();
    assert_eq!(marker.kind, NodeKind::Relation);

    let defines: Vec<_> = graph.edges_of_kind(EdgeKind::Defines).collect();
    assert_eq!(defines.len(), 1);
    assert_eq!(defines[0].to.node, marker.id);

    let uses: Vec<_> = graph.edges_of_kind(EdgeKind::Uses).collect();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].from.node, marker.id);

    // Catalog types survive the round trip through the CTE.
    let terminal = graph.terminal_node().unwrap();
    let result = graph.snapshot_for(&terminal.id).unwrap();
    assert_eq!(result.schema.columns.len(), 1);
    assert_eq!(result.schema.columns[0].name, "id");
    assert_eq!(result.schema.columns[0].data_type.as_deref(), Some("int"));
    assert_eq!(
        result.schema.columns[0].source,
        ColumnSource::Relation("recent".to_string())
    );
}

#[test]
fn cte_declared_column_aliases_rename_positionally() {
    let graph = convert_one(
        "CREATE TABLE raw_events (id INT, kind TEXT);
         WITH named (event_id, event_kind) AS (SELECT id, kind FROM raw_events)
         SELECT event_kind FROM named",
    );

    let terminal = graph.terminal_node().unwrap();
    let result = graph.snapshot_for(&terminal.id).unwrap();
    assert_eq!(result.schema.columns[0].name, "event_kind");
    assert_eq!(result.schema.columns[0].data_type.as_deref(), Some("text"));
}

#[test]
fn correlated_exists_reports_outer_fields() {
    let graph = convert_one(
        "CREATE TABLE customers (customer_id INT);
         CREATE TABLE orders (customer_id INT);
         SELECT * FROM customers c
         WHERE EXISTS (SELECT 1 FROM orders o WHERE o.customer_id = c.customer_id)",
    );

    let subquery = graph
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Subquery)
        .unwrap();
    let info = subquery.subquery.as_ref().unwrap();
    assert_eq!(info.correlated_fields, vec!["c.customer_id"]);

    let from_node = graph.nodes.iter().find(|n| n.label.starts_with("FROM")).unwrap();
    let correlations: Vec<_> = graph.edges_of_kind(EdgeKind::Correlation).collect();
    assert_eq!(correlations.len(), 1);
    assert_eq!(correlations[0].from.node, subquery.id);
    assert_eq!(correlations[0].to.node, from_node.id);
    assert_eq!(correlations[0].label.as_deref(), Some("c.customer_id"));
}

#[test]
fn having_subquery_still_correlates_after_grouping() {
    let graph = convert_one(
        "CREATE TABLE emp (dept TEXT, salary INT);
         CREATE TABLE audit (dept TEXT);
         SELECT dept FROM emp e
         GROUP BY dept
         HAVING EXISTS (SELECT 1 FROM audit a WHERE a.dept = e.dept)",
    );

    let subquery = graph
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Subquery)
        .unwrap();
    let info = subquery.subquery.as_ref().unwrap();
    assert_eq!(info.correlated_fields, vec!["e.dept"]);

    let from_node = graph.nodes.iter().find(|n| n.label.starts_with("FROM")).unwrap();
    let correlations: Vec<_> = graph.edges_of_kind(EdgeKind::Correlation).collect();
    assert_eq!(correlations.len(), 1);
    assert_eq!(correlations[0].from.node, subquery.id);
    assert_eq!(correlations[0].to.node, from_node.id);
    assert_eq!(correlations[0].label.as_deref(), Some("e.dept"));
}

#[test]
fn uncorrelated_subquery_has_no_correlation() {
    let graph = convert_one(
        "CREATE TABLE customers (customer_id INT);
         CREATE TABLE banned (customer_id INT);
         SELECT * FROM customers WHERE customer_id IN (SELECT customer_id FROM banned)",
    );

    let subquery = graph
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Subquery)
        .unwrap();
    let info = subquery.subquery.as_ref().unwrap();
    assert!(info.correlated_fields.is_empty());
    assert_eq!(graph.edges_of_kind(EdgeKind::Correlation).count(), 0);
}

#[test]
fn subquery_placeholder_matches_where_text_and_edge_label() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         SELECT name FROM users WHERE id IN (SELECT user_id FROM banned)",
    );

    let where_node = graph.nodes.iter().find(|n| n.label == "WHERE").unwrap();
    assert_eq!(where_node.sql.as_deref(), Some("id IN expr"));

    let results: Vec<_> = graph.edges_of_kind(EdgeKind::SubqueryResult).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].label.as_deref(), Some("expr"));
    assert_eq!(results[0].to.node, where_node.id);
}

#[test]
fn nested_subquery_ids_extend_parent_prefix() {
    let graph = convert_one(
        "CREATE TABLE t (id INT);
         SELECT * FROM t WHERE id IN
            (SELECT id FROM a WHERE x IN (SELECT y FROM b))",
    );

    let outer = graph
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Subquery)
        .unwrap();
    let outer_info = outer.subquery.as_ref().unwrap();
    assert!(outer_info
        .inner_graph
        .nodes
        .iter()
        .all(|n| n.id.starts_with("subq_0_")));

    let nested: Vec<_> = outer_info
        .inner_graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Subquery)
        .collect();
    assert_eq!(nested.len(), 1);
    let nested_info = nested[0].subquery.as_ref().unwrap();
    assert!(nested_info
        .inner_graph
        .nodes
        .iter()
        .all(|n| n.id.starts_with("subq_0_subq_0_")));
}

#[test]
fn flattened_subquery_ids_never_collide() {
    fn collect_ids(graph: &Graph, out: &mut Vec<String>) {
        for node in &graph.nodes {
            out.push(node.id.clone());
            if let Some(info) = &node.subquery {
                collect_ids(&info.inner_graph, out);
            }
        }
        for edge in &graph.edges {
            out.push(edge.id.clone());
        }
    }

    let graph = convert_one(
        "CREATE TABLE t (id INT);
         SELECT * FROM t
         WHERE id IN (SELECT id FROM a WHERE x IN (SELECT y FROM b))
           AND EXISTS (SELECT 1 FROM c WHERE c.id = t.id)",
    );

    let mut ids = Vec::new();
    collect_ids(&graph, &mut ids);
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total, "duplicate id after flattening");
}

#[test]
fn derived_table_exposes_inner_columns_under_alias() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         SELECT d.id FROM (SELECT id FROM users) d",
    );

    let from_node = graph
        .nodes
        .iter()
        .find(|n| n.label == "FROM (subquery) d")
        .unwrap();
    let results: Vec<_> = graph.edges_of_kind(EdgeKind::SubqueryResult).collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].to.node, from_node.id);

    let terminal = graph.terminal_node().unwrap();
    let result = graph.snapshot_for(&terminal.id).unwrap();
    assert_eq!(result.schema.columns.len(), 1);
    assert_eq!(result.schema.columns[0].name, "id");
    assert_eq!(result.schema.columns[0].data_type.as_deref(), Some("int"));
    assert_eq!(
        result.schema.columns[0].source,
        ColumnSource::Relation("d".to_string())
    );
}

#[test]
fn ctas_draws_maps_to_from_terminal_step() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         CREATE TABLE snapshot AS SELECT id FROM users ORDER BY id",
    );

    let create = graph
        .nodes
        .iter()
        .find(|n| n.label == "CREATE TABLE snapshot")
        .unwrap();
    let order_by = graph.nodes.iter().find(|n| n.label == "ORDER BY").unwrap();

    let maps: Vec<_> = graph.edges_of_kind(EdgeKind::MapsTo).collect();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].from.node, order_by.id);
    assert_eq!(maps[0].to.node, create.id);
}

#[test]
fn ctas_without_order_by_maps_from_select() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         CREATE TABLE snapshot AS SELECT id FROM users",
    );

    let select = graph.nodes.iter().find(|n| n.label == "SELECT").unwrap();
    let maps: Vec<_> = graph.edges_of_kind(EdgeKind::MapsTo).collect();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].from.node, select.id);
}

#[test]
fn update_emits_root_and_where() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         UPDATE users SET name = 'bob' WHERE id = 7",
    );

    assert_eq!(graph.nodes[0].label, "UPDATE users");
    assert_eq!(graph.nodes[0].kind, NodeKind::Op);
    assert_eq!(graph.nodes[0].sql.as_deref(), Some("name = 'bob'"));
    assert_eq!(graph.nodes[1].label, "WHERE");
    assert_eq!(graph.nodes[1].sql.as_deref(), Some("id = 7"));
    assert_eq!(graph.edges_of_kind(EdgeKind::Flow).count(), 1);
    assert!(graph.snapshots.is_empty());
}

#[test]
fn delete_with_subquery_in_where() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         DELETE FROM users WHERE id IN (SELECT user_id FROM banned)",
    );

    assert_eq!(graph.nodes[0].label, "DELETE FROM users");
    let subqueries = graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Subquery)
        .count();
    assert_eq!(subqueries, 1);
    assert_eq!(graph.edges_of_kind(EdgeKind::SubqueryResult).count(), 1);
}

#[test]
fn insert_is_a_single_node() {
    let graph = convert_one("INSERT INTO users (id, name) VALUES (1, 'a')");
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].label, "INSERT INTO users");
    assert!(graph.edges.is_empty());
}

#[test]
fn unknown_statement_kind_is_a_hard_error() {
    let statements = parse("DROP TABLE users");
    let catalog = TableCatalog::extract(&statements);
    let err = convert_statement(&statements[0], &catalog).unwrap_err();
    match err {
        ConvertError::UnsupportedStatement { kind } => assert_eq!(kind, "DROP"),
    }
}

#[test]
fn plain_ddl_produces_no_graph() {
    let statements = parse("CREATE TABLE users (id INT)");
    let graphs = convert_script(&statements).unwrap();
    assert!(graphs.is_empty());
}

#[test]
fn graph_serializes_with_camel_case_wire_names() {
    let graph = convert_one("CREATE TABLE users (id INT); SELECT id FROM users");
    let json = serde_json::to_value(&graph).unwrap();

    assert_eq!(json["nodes"][0]["kind"], "relation");
    assert_eq!(json["edges"][0]["kind"], "flow");
    let snapshot = &json["snapshots"][0];
    assert!(snapshot["nodeId"].is_string());
    assert_eq!(snapshot["schema"]["columns"][0]["type"], "int");
    assert_eq!(snapshot["schema"]["columns"][0]["source"], "users");
}

#[test]
fn graph_round_trips_through_json() {
    let graph = convert_one(
        "CREATE TABLE users (id INT, name TEXT);
         SELECT name FROM users WHERE id IN (SELECT user_id FROM banned)",
    );

    let json = serde_json::to_string(&graph).unwrap();
    let back: Graph = serde_json::from_str(&json).unwrap();
    assert_eq!(back.nodes.len(), graph.nodes.len());
    assert_eq!(back.edges.len(), graph.edges.len());
    assert_eq!(back.snapshots.len(), graph.snapshots.len());

    let subquery = back
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Subquery)
        .unwrap();
    assert!(subquery.subquery.is_some());
}
