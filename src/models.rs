//! Core data models used throughout the lakehouse adapter.
//!
//! These types represent the schema proposals, row sets, and query results
//! that flow through the ingestion and analyst pipelines. Model output is
//! loosely typed JSON; everything here is validated structurally before it
//! reaches the store (declared types are never trusted blindly).

use serde::{Deserialize, Serialize};

/// One record as extracted or queried: an ordered column → value mapping.
/// Rows may be sparse (missing fields) prior to validation.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Ordered sequence of records aligned to a schema proposal.
pub type RowSet = Vec<Record>;

/// Semantic column type. Parsed leniently from whatever SQL type name the
/// model declares; anything unrecognized falls back to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Double,
    Boolean,
    Date,
    Json,
}

impl ColumnType {
    /// Lenient parse of a model-declared SQL type name.
    pub fn parse(raw: &str) -> ColumnType {
        let t = raw.trim().to_ascii_uppercase();
        if t.starts_with("INT") || t == "BIGINT" || t == "SMALLINT" {
            ColumnType::Integer
        } else if t.starts_with("DOUBLE")
            || t.starts_with("FLOAT")
            || t.starts_with("REAL")
            || t.starts_with("DECIMAL")
            || t.starts_with("NUMERIC")
        {
            ColumnType::Double
        } else if t.starts_with("BOOL") {
            ColumnType::Boolean
        } else if t.starts_with("DATE") || t.starts_with("TIMESTAMP") {
            ColumnType::Date
        } else if t == "JSON" {
            ColumnType::Json
        } else {
            // VARCHAR, TEXT, CHAR, STRING, and everything else
            ColumnType::Text
        }
    }

    /// Declared type used in CREATE TABLE / ALTER TABLE statements.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Json => "JSON",
        }
    }

    /// Map a declared SQLite type back to the semantic type shown by
    /// `describe`.
    pub fn from_sql_type(decl: &str) -> ColumnType {
        match decl.trim().to_ascii_uppercase().as_str() {
            "INTEGER" => ColumnType::Integer,
            "REAL" => ColumnType::Double,
            "BOOLEAN" => ColumnType::Boolean,
            "DATE" => ColumnType::Date,
            "JSON" => ColumnType::Json,
            _ => ColumnType::Text,
        }
    }

    /// Display name used in `describe` output and analyst prompts.
    pub fn semantic_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "string",
            ColumnType::Integer => "integer",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Json => "json",
        }
    }
}

/// One proposed column: name, semantic type, optional model description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Model-inferred schema for one ingested artifact. Mutated only by the
/// validator/fixer before approval; discarded after load or rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProposal {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

/// Full result of analyzing one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub document_type: String,
    pub schema: SchemaProposal,
    pub rows: RowSet,
    /// Quality issues the model flagged during extraction.
    #[serde(default)]
    pub issues: Vec<String>,
}

/// One uploaded artifact handed to the extractor.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Binary image, inlined base64 into the model request.
    Image { mime_type: String, bytes: Vec<u8> },
    /// Textual content (CSV, JSON, plain text).
    Text { content: String },
}

impl Artifact {
    /// Classify uploaded bytes by MIME type.
    pub fn from_bytes(mime_type: &str, bytes: Vec<u8>) -> anyhow::Result<Artifact> {
        if mime_type.starts_with("image/") {
            Ok(Artifact::Image {
                mime_type: mime_type.to_string(),
                bytes,
            })
        } else {
            let content = String::from_utf8(bytes)
                .map_err(|_| anyhow::anyhow!("artifact is not valid UTF-8: {}", mime_type))?;
            Ok(Artifact::Text { content })
        }
    }
}

/// Table summary returned by `list_tables`.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
}

/// Ephemeral tabular result of a SQL query. Not persisted beyond the render.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Chart kinds the analyst can suggest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
}

/// Chart suggestion derived from a query result.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
}

/// Full analyst answer: generated SQL, one-line natural-language answer,
/// the executed result, and an optional chart suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub sql: String,
    pub answer: String,
    pub result: QueryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

/// Returns true for names the store accepts as table or column identifiers:
/// ASCII snake_case, starting with a letter or underscore.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_lenient() {
        assert_eq!(ColumnType::parse("VARCHAR"), ColumnType::Text);
        assert_eq!(ColumnType::parse("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::parse("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::parse("int"), ColumnType::Integer);
        assert_eq!(ColumnType::parse("DOUBLE"), ColumnType::Double);
        assert_eq!(ColumnType::parse("FLOAT"), ColumnType::Double);
        assert_eq!(ColumnType::parse("DECIMAL(10,2)"), ColumnType::Double);
        assert_eq!(ColumnType::parse("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(ColumnType::parse("DATE"), ColumnType::Date);
        assert_eq!(ColumnType::parse("TIMESTAMP"), ColumnType::Date);
        assert_eq!(ColumnType::parse("JSON"), ColumnType::Json);
        assert_eq!(ColumnType::parse("geometry"), ColumnType::Text);
    }

    #[test]
    fn sql_type_round_trips() {
        for ct in [
            ColumnType::Text,
            ColumnType::Integer,
            ColumnType::Double,
            ColumnType::Boolean,
            ColumnType::Date,
            ColumnType::Json,
        ] {
            assert_eq!(ColumnType::from_sql_type(ct.sql_type()), ct);
        }
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("sales_transactions"));
        assert!(is_valid_identifier("_ingested"));
        assert!(is_valid_identifier("qty2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("Sales"));
        assert!(!is_valid_identifier("drop table; --"));
        assert!(!is_valid_identifier("total amount"));
    }

    #[test]
    fn artifact_classification() {
        let img = Artifact::from_bytes("image/png", vec![0x89, 0x50]).unwrap();
        assert!(matches!(img, Artifact::Image { .. }));

        let txt = Artifact::from_bytes("text/csv", b"a,b\n1,2".to_vec()).unwrap();
        assert!(matches!(txt, Artifact::Text { .. }));

        assert!(Artifact::from_bytes("text/plain", vec![0xff, 0xfe]).is_err());
    }
}
