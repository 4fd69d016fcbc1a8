//! qf-convert: SQL statements to flow graphs
//!
//! This crate turns parsed SQL (via `sqlparser`) into renderer-ready
//! flow graphs: one node per clause or relation, flow edges for clause
//! sequencing, dedicated edges for CTE definition/use, subquery
//! results, correlation, and CTAS materialization, plus schema
//! snapshots recording how the column set evolves through the
//! statement.
//!
//! Typical use is [`convert_script`]: it extracts a table catalog from
//! every `CREATE TABLE` in the input, then converts each statement
//! against that catalog.

pub(crate) mod catalog;
pub(crate) mod context;
pub(crate) mod convert;
pub(crate) mod error;
pub(crate) mod print;
pub(crate) mod schema_flow;

pub use catalog::{CatalogColumn, TableCatalog, TableSchema};
pub use convert::{convert_script, convert_statement};
pub use error::{ConvertError, ConvertResult};
