//! Column schemas and the snapshot log
//!
//! A snapshot captures the relational schema state immediately after one
//! operator's effect is applied. Snapshots form an append-only log and are
//! never mutated after creation.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a column's value currently comes from.
///
/// Synthetic sources use reserved, underscore-prefixed tokens on the wire so
/// renderers can tell them apart from real relation aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// The relation alias currently exposing the column
    Relation(String),
    /// Produced by an aggregate function during projection
    Aggregate,
    /// Produced by a non-aggregate computed expression during projection
    Expression,
    /// Could not be resolved against any known relation
    Unknown,
}

impl ColumnSource {
    /// The wire token for this source
    pub fn as_str(&self) -> &str {
        match self {
            ColumnSource::Relation(alias) => alias,
            ColumnSource::Aggregate => "_aggregate",
            ColumnSource::Expression => "_expression",
            ColumnSource::Unknown => "_unknown",
        }
    }
}

impl std::fmt::Display for ColumnSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ColumnSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(match token.as_str() {
            "_aggregate" => ColumnSource::Aggregate,
            "_expression" => ColumnSource::Expression,
            "_unknown" => ColumnSource::Unknown,
            "" => return Err(D::Error::custom("empty column source token")),
            _ => ColumnSource::Relation(token),
        })
    }
}

/// One visible column at a point in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Unique per conversion, minted by the context's column counter
    pub id: String,
    /// Column name as exposed by the current relation
    pub name: String,
    /// Lower-cased SQL type string with precision suffix preserved
    /// (`varchar(100)`, `decimal(10,2)`); `None` when inferred/untyped
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Relation alias (or synthetic token) currently exposing the column
    pub source: ColumnSource,
    /// Underlying physical table name, when it differs from or backs the alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Id of the node where this column first became visible
    #[serde(rename = "sourceNodeId", default, skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
}

impl ColumnSchema {
    /// Returns true when the column's type could not be determined
    pub fn is_untyped(&self) -> bool {
        self.data_type.is_none()
    }
}

/// The column set captured by one snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotSchema {
    /// Flat, ordered view of every visible column across all relations
    pub columns: Vec<ColumnSchema>,
}

/// Schema state recorded immediately after one relation-affecting step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// The node whose effect this snapshot reflects
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// Visible columns after the step
    pub schema: SnapshotSchema,
}
