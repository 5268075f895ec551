//! Schema/row validation and model-assisted correction.
//!
//! Detection is purely structural and local: it inspects the extracted rows
//! against the proposed columns and reports human-readable issues without
//! modifying the data. [`auto_fix`] sends the rows and issue list back to the
//! model with a correction prompt; an unparsable correction is a total
//! [`LakehouseError::Fix`] failure.
//!
//! Caller-edited schema or rows are accepted as-is beyond a structural JSON
//! parse — the human override is trusted.

use anyhow::Result;
use chrono::NaiveDate;

use crate::error::LakehouseError;
use crate::gemini::{extract_json, GeminiClient, Part};
use crate::models::{ColumnDef, ColumnType, Record, RowSet};

const FIX_PROMPT: &str = r#"You are an expert Data Quality Engineer.

Your task: Fix the listed issues in the provided data.

Cleaning Rules:
1. Standardize date formats to YYYY-MM-DD
2. Fix inconsistent formatting (capitalization, spacing)
3. Fill obvious missing values or use null
4. Remove duplicate entries
5. Correct clear typos and misspellings
6. Ensure numeric values are properly formatted
7. Standardize categorical values

IMPORTANT:
- Maintain all original data rows
- Only fix the specific issues mentioned
- Preserve data accuracy
- Return valid JSON only (no markdown)

Output Format:
[
    {"column1": "cleaned_value1", "column2": "cleaned_value2"}
]"#;

/// Inspect rows against the proposed columns and report issues. The data is
/// never modified here.
pub fn detect_issues(columns: &[ColumnDef], rows: &RowSet) -> Vec<String> {
    let mut issues = Vec::new();

    for col in columns {
        let kinds = observed_kinds(&col.name, rows);
        if kinds.len() > 1 {
            issues.push(format!(
                "column '{}' has mixed value types across rows ({})",
                col.name,
                kinds.join(", ")
            ));
        }

        let missing = rows
            .iter()
            .filter(|r| is_missing(r, &col.name))
            .count();
        if missing > 0 && missing < rows.len() {
            issues.push(format!(
                "column '{}' is missing in {} of {} rows",
                col.name,
                missing,
                rows.len()
            ));
        }

        if col.column_type == ColumnType::Date {
            let formats = observed_date_formats(&col.name, rows);
            if formats.len() > 1 {
                issues.push(format!(
                    "column '{}' mixes date formats ({})",
                    col.name,
                    formats.join(", ")
                ));
            }
        }
    }

    issues
}

/// Ask the model to correct the flagged rows. Returns the revised row set.
pub async fn auto_fix(
    client: &GeminiClient,
    rows: &RowSet,
    issues: &[String],
) -> Result<RowSet> {
    let issues_json = serde_json::to_string_pretty(issues)?;
    let data_json = serde_json::to_string_pretty(rows)?;

    let parts = vec![
        Part::Text(FIX_PROMPT.to_string()),
        Part::Text(format!("Data Quality Issues Detected:\n{}", issues_json)),
        Part::Text(format!("Data to Clean:\n{}", data_json)),
    ];

    let response = client
        .generate(&parts)
        .await
        .map_err(|e| LakehouseError::Fix(e.to_string()))?;

    parse_fixed_rows(&response).map_err(|e| LakehouseError::Fix(e.to_string()).into())
}

/// Parse a corrected row set out of model output.
pub fn parse_fixed_rows(response: &str) -> Result<RowSet> {
    let value = extract_json(response)
        .ok_or_else(|| anyhow::anyhow!("no JSON array in model output"))?;

    let array = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("correction is not a JSON array"))?;

    array
        .iter()
        .map(|v| {
            v.as_object()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("corrected entry is not an object"))
        })
        .collect()
}

fn is_missing(record: &Record, column: &str) -> bool {
    matches!(record.get(column), None | Some(serde_json::Value::Null))
}

/// Distinct non-null value kinds observed for a column, in a stable order.
/// Integers and floats count as one numeric kind.
fn observed_kinds(column: &str, rows: &RowSet) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    let mut push = |k: &'static str| {
        if !kinds.contains(&k) {
            kinds.push(k);
        }
    };

    for record in rows {
        match record.get(column) {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Number(_)) => push("number"),
            Some(serde_json::Value::Bool(_)) => push("boolean"),
            Some(serde_json::Value::String(_)) => push("text"),
            Some(_) => push("nested"),
        }
    }

    kinds
}

/// Date formats the validator can recognize.
const DATE_FORMATS: [(&str, &str); 5] = [
    ("%Y-%m-%d", "YYYY-MM-DD"),
    ("%Y/%m/%d", "YYYY/MM/DD"),
    ("%d/%m/%Y", "DD/MM/YYYY"),
    ("%d-%m-%Y", "DD-MM-YYYY"),
    ("%B %d, %Y", "Month DD, YYYY"),
];

/// Distinct recognized formats across a column's string values. A value that
/// matches several formats (e.g. 01/02/2024) counts as its first match.
fn observed_date_formats(column: &str, rows: &RowSet) -> Vec<&'static str> {
    let mut formats = Vec::new();

    for record in rows {
        let Some(serde_json::Value::String(s)) = record.get(column) else {
            continue;
        };
        for (pattern, label) in DATE_FORMATS {
            if NaiveDate::parse_from_str(s.trim(), pattern).is_ok() {
                if !formats.contains(&label) {
                    formats.push(label);
                }
                break;
            }
        }
    }

    formats
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows_from(values: serde_json::Value) -> RowSet {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn col(name: &str, column_type: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            column_type,
            description: None,
        }
    }

    #[test]
    fn clean_rows_have_no_issues() {
        let columns = vec![col("item", ColumnType::Text), col("qty", ColumnType::Integer)];
        let rows = rows_from(json!([
            {"item": "A", "qty": 3},
            {"item": "B", "qty": 5}
        ]));
        assert!(detect_issues(&columns, &rows).is_empty());
    }

    #[test]
    fn mixed_types_flagged() {
        let columns = vec![col("qty", ColumnType::Integer)];
        let rows = rows_from(json!([{"qty": 3}, {"qty": "five"}]));
        let issues = detect_issues(&columns, &rows);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("mixed value types"));
        assert!(issues[0].contains("qty"));
    }

    #[test]
    fn int_and_float_are_one_kind() {
        let columns = vec![col("price", ColumnType::Double)];
        let rows = rows_from(json!([{"price": 3}, {"price": 4.5}]));
        assert!(detect_issues(&columns, &rows).is_empty());
    }

    #[test]
    fn missing_values_flagged() {
        let columns = vec![col("item", ColumnType::Text)];
        let rows = rows_from(json!([{"item": "A"}, {"item": null}, {}]));
        let issues = detect_issues(&columns, &rows);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("missing in 2 of 3"));
    }

    #[test]
    fn wholly_absent_column_not_flagged_as_missing() {
        // A column no row carries is an evolution concern, not a gap.
        let columns = vec![col("notes", ColumnType::Text)];
        let rows = rows_from(json!([{}, {}]));
        assert!(detect_issues(&columns, &rows).is_empty());
    }

    #[test]
    fn mixed_date_formats_flagged() {
        let columns = vec![col("sold_on", ColumnType::Date)];
        let rows = rows_from(json!([
            {"sold_on": "2024-01-15"},
            {"sold_on": "15/01/2024"}
        ]));
        let issues = detect_issues(&columns, &rows);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("date formats"));
    }

    #[test]
    fn uniform_dates_pass() {
        let columns = vec![col("sold_on", ColumnType::Date)];
        let rows = rows_from(json!([
            {"sold_on": "2024-01-15"},
            {"sold_on": "2024-02-20"}
        ]));
        assert!(detect_issues(&columns, &rows).is_empty());
    }

    #[test]
    fn parse_fixed_rows_accepts_fenced_array() {
        let text = "```json\n[{\"item\": \"A\", \"qty\": 3}]\n```";
        let rows = parse_fixed_rows(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["item"], "A");
    }

    #[test]
    fn parse_fixed_rows_rejects_object() {
        assert!(parse_fixed_rows("{\"not\": \"an array\"}").is_err());
    }

    #[test]
    fn parse_fixed_rows_rejects_prose() {
        assert!(parse_fixed_rows("Sorry, I cannot clean this data.").is_err());
    }
}
