//! Source table catalog extracted from DDL
//!
//! `CREATE TABLE` statements in the input script declare the physical
//! tables later statements read from. The catalog is built in a single
//! pass before any conversion so every graph sees the full set of
//! declared tables regardless of statement order.

use std::collections::HashMap;

use sqlparser::ast::{ColumnOption, Statement};

/// A column as declared in a `CREATE TABLE` column list.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    pub name: String,
    /// Lowercased rendering of the declared type, e.g. `varchar(255)`.
    pub data_type: String,
    pub nullable: Option<bool>,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<String>,
}

/// A physical table declared by DDL.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<CatalogColumn>,
}

/// All declared tables, keyed case-insensitively by name.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: HashMap<String, TableSchema>,
}

impl TableCatalog {
    /// Builds a catalog from every `CREATE TABLE` in the script.
    ///
    /// Non-DDL statements are ignored here; `CREATE TABLE ... AS` counts
    /// only for its explicit column list, which is empty by construction,
    /// so CTAS targets never shadow real declarations.
    pub fn extract(statements: &[Statement]) -> Self {
        let mut tables = HashMap::new();

        for statement in statements {
            let Statement::CreateTable(ct) = statement else {
                continue;
            };
            if ct.columns.is_empty() {
                continue;
            }

            let name = ct.name.to_string();
            let mut columns = Vec::with_capacity(ct.columns.len());
            for def in &ct.columns {
                let col_name = def.name.value.clone();
                if col_name.is_empty() {
                    log::warn!("Skipping unnamed column in table '{}'", name);
                    continue;
                }

                let mut column = CatalogColumn {
                    name: col_name,
                    data_type: def.data_type.to_string().to_lowercase(),
                    nullable: None,
                    primary_key: false,
                    unique: false,
                    default: None,
                };
                for opt in &def.options {
                    match &opt.option {
                        ColumnOption::NotNull => column.nullable = Some(false),
                        ColumnOption::Null => column.nullable = Some(true),
                        ColumnOption::Default(expr) => {
                            column.default = Some(expr.to_string());
                        }
                        ColumnOption::PrimaryKey(_) => {
                            column.primary_key = true;
                            column.nullable = Some(false);
                        }
                        ColumnOption::Unique(_) => column.unique = true,
                        _ => {}
                    }
                }
                columns.push(column);
            }

            tables.insert(name.to_lowercase(), TableSchema { name, columns });
        }

        TableCatalog { tables }
    }

    /// Looks up a table case-insensitively by its full name.
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse(sql: &str) -> Vec<Statement> {
        Parser::parse_sql(&GenericDialect {}, sql).unwrap()
    }

    #[test]
    fn extracts_columns_with_constraints() {
        let stmts = parse(
            "CREATE TABLE users (
                id INT PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                age INT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
        );
        let catalog = TableCatalog::extract(&stmts);
        let users = catalog.get("users").unwrap();
        assert_eq!(users.columns.len(), 4);

        let id = &users.columns[0];
        assert!(id.primary_key);
        assert_eq!(id.nullable, Some(false));
        assert_eq!(id.data_type, "int");

        let email = &users.columns[1];
        assert!(email.unique);
        assert_eq!(email.nullable, Some(false));
        assert_eq!(email.data_type, "varchar(255)");

        let age = &users.columns[2];
        assert_eq!(age.nullable, Some(true));

        let created = &users.columns[3];
        assert!(created.default.is_some());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let stmts = parse("CREATE TABLE Orders (id INT)");
        let catalog = TableCatalog::extract(&stmts);
        assert!(catalog.get("orders").is_some());
        assert!(catalog.get("ORDERS").is_some());
        assert_eq!(catalog.get("orders").unwrap().name, "Orders");
    }

    #[test]
    fn ctas_without_column_list_is_skipped() {
        let stmts = parse("CREATE TABLE report AS SELECT 1 AS one");
        let catalog = TableCatalog::extract(&stmts);
        assert!(catalog.get("report").is_none());
    }
}
