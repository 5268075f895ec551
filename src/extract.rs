//! Document extraction: one artifact in, a schema proposal + row set out.
//!
//! Sends the uploaded artifact (image bytes inlined base64, or text) with a
//! schema-discovery prompt to the model and parses the response into an
//! [`Extraction`]. The model's free-text answer is expected to embed one
//! JSON object; anything unparsable is a total [`LakehouseError::Extraction`]
//! failure — there is no retry and no partial parse.

use anyhow::{anyhow, Result};

use crate::error::LakehouseError;
use crate::gemini::{extract_json, GeminiClient, Part};
use crate::models::{Artifact, ColumnDef, ColumnType, Extraction, Record, SchemaProposal};

const DISCOVERY_PROMPT: &str = r#"You are an expert Data Engineer specializing in schema discovery and data extraction.

Your task: Analyze the provided unstructured data and extract structured, clean data.

Steps:
1. Identify the document type (e.g., "Invoice", "Sales Report", "Inventory List")
2. Suggest a descriptive table name in snake_case (e.g., "sales_transactions", "customer_invoices")
3. Extract ALL data into a list of JSON objects
4. Standardize column names to snake_case (e.g., "customer_name", "total_amount")
5. Assign appropriate SQL data types:
   - VARCHAR for text/strings
   - INTEGER for whole numbers
   - DOUBLE for decimals
   - DATE for dates (format: YYYY-MM-DD)
   - BOOLEAN for true/false values
6. Identify data quality issues:
   - Mixed date formats
   - Missing critical values
   - Inconsistent formatting
   - Duplicate entries

Output Format (JSON only, no markdown):
{
    "document_type": "Type of document",
    "table_name": "suggested_table_name",
    "columns": [
        {"name": "column_name", "type": "SQL_TYPE", "description": "Brief description"}
    ],
    "data": [
        {"column_name": "value"}
    ],
    "issues": ["Issue 1", "Issue 2"]
}

Requirements:
- Extract ALL rows/records, not just samples
- Maintain data accuracy and completeness
- Flag ANY quality concerns
- Return valid JSON only"#;

/// Analyze one artifact and propose a schema plus extracted rows.
///
/// Exactly one outbound model call; failures (transport, non-2xx, or
/// unparsable output) surface as [`LakehouseError::Extraction`].
pub async fn analyze_artifact(
    client: &GeminiClient,
    artifact: &Artifact,
    file_name: &str,
) -> Result<Extraction> {
    let mut parts = vec![
        Part::Text(DISCOVERY_PROMPT.to_string()),
        Part::Text(format!("Filename: {}", file_name)),
    ];

    match artifact {
        Artifact::Image { mime_type, bytes } => parts.push(Part::InlineImage {
            mime_type: mime_type.clone(),
            bytes: bytes.clone(),
        }),
        Artifact::Text { content } => parts.push(Part::Text(content.clone())),
    }

    let response = client
        .generate(&parts)
        .await
        .map_err(|e| LakehouseError::Extraction(e.to_string()))?;

    parse_extraction(&response).map_err(|e| LakehouseError::Extraction(e.to_string()).into())
}

/// Structural parse of the model's discovery output. Declared types are
/// parsed leniently; missing table names fall back to `data_table`.
pub fn parse_extraction(response: &str) -> Result<Extraction> {
    let value = extract_json(response).ok_or_else(|| anyhow!("no JSON object in model output"))?;

    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("model output is not a JSON object"))?;

    let document_type = obj
        .get("document_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_string();

    let table_name = obj
        .get("table_name")
        .and_then(|v| v.as_str())
        .unwrap_or("data_table")
        .to_string();

    let columns = obj
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing columns array"))?
        .iter()
        .map(parse_column)
        .collect::<Result<Vec<ColumnDef>>>()?;

    let rows = obj
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing data array"))?
        .iter()
        .map(|v| {
            v.as_object()
                .cloned()
                .ok_or_else(|| anyhow!("data entry is not an object"))
        })
        .collect::<Result<Vec<Record>>>()?;

    let issues = obj
        .get("issues")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(Extraction {
        document_type,
        schema: SchemaProposal {
            table_name,
            columns,
        },
        rows,
        issues,
    })
}

fn parse_column(value: &serde_json::Value) -> Result<ColumnDef> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("column entry is not an object"))?;

    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("column entry missing name"))?
        .to_string();

    let column_type = obj
        .get("type")
        .and_then(|v| v.as_str())
        .map(ColumnType::parse)
        .unwrap_or(ColumnType::Text);

    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(ColumnDef {
        name,
        column_type,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"```json
{
    "document_type": "Sales Report",
    "table_name": "sales",
    "columns": [
        {"name": "item", "type": "VARCHAR", "description": "Item name"},
        {"name": "qty", "type": "INTEGER"}
    ],
    "data": [
        {"item": "A", "qty": 3},
        {"item": "B", "qty": 5}
    ],
    "issues": []
}
```"#;

    #[test]
    fn parses_full_extraction() {
        let ex = parse_extraction(SAMPLE).unwrap();
        assert_eq!(ex.document_type, "Sales Report");
        assert_eq!(ex.schema.table_name, "sales");
        assert_eq!(ex.schema.columns.len(), 2);
        assert_eq!(ex.schema.columns[0].column_type, ColumnType::Text);
        assert_eq!(ex.schema.columns[1].column_type, ColumnType::Integer);
        assert_eq!(ex.rows.len(), 2);
        assert!(ex.issues.is_empty());
    }

    #[test]
    fn carries_model_issues() {
        let text = r#"{"document_type": "Invoice", "table_name": "invoices",
            "columns": [{"name": "total", "type": "DOUBLE"}],
            "data": [{"total": 12.5}],
            "issues": ["Mixed date formats in due_date"]}"#;
        let ex = parse_extraction(text).unwrap();
        assert_eq!(ex.issues.len(), 1);
    }

    #[test]
    fn defaults_for_missing_names() {
        let text = r#"{"columns": [], "data": []}"#;
        let ex = parse_extraction(text).unwrap();
        assert_eq!(ex.document_type, "Unknown");
        assert_eq!(ex.schema.table_name, "data_table");
    }

    #[test]
    fn rejects_prose_output() {
        assert!(parse_extraction("I could not read the document.").is_err());
    }

    #[test]
    fn rejects_non_object_rows() {
        let text = r#"{"columns": [], "data": [1, 2, 3]}"#;
        assert!(parse_extraction(text).is_err());
    }
}
