//! CSV export for approved row sets and query results.
//!
//! Used by the `lake export` command and the download path of the ingest
//! flow. Column order is first-seen order across the rows; fields containing
//! delimiters are quoted per RFC 4180.

use crate::models::{QueryResult, RowSet};

/// Render a row set as CSV. Columns are the union of all record keys in
/// first-seen order; missing fields render empty.
pub fn rowset_to_csv(rows: &RowSet) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for record in rows {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut out = String::new();
    write_record(&mut out, columns.iter().copied());

    for record in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| record.get(*c).map(render_value).unwrap_or_default())
            .collect();
        write_record(&mut out, fields.iter().map(String::as_str));
    }

    out
}

/// Render a query result as CSV with its own column order.
pub fn query_result_to_csv(result: &QueryResult) -> String {
    let mut out = String::new();
    write_record(&mut out, result.columns.iter().map(String::as_str));

    for row in &result.rows {
        let fields: Vec<String> = row.iter().map(render_value).collect();
        write_record(&mut out, fields.iter().map(String::as_str));
    }

    out
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
