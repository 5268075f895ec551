//! Natural-language analyst: question + selected tables → SQL → result.
//!
//! Builds a schema-context prompt from the selected tables' columns,
//! advertises identically named columns as likely join keys (advisory only),
//! asks the model for a single SQL statement plus a one-line answer, executes
//! the SQL against the session store, and derives a chart suggestion from the
//! result shape. No retry at any step: a response with no extractable SQL is
//! [`LakehouseError::Generation`]; SQL that executes but errors propagates as
//! [`LakehouseError::Query`].

use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::error::LakehouseError;
use crate::gemini::{extract_json, extract_sql, GeminiClient, Part};
use crate::models::{Answer, ChartKind, ChartSpec, ColumnDef, QueryResult};
use crate::store::{Lakehouse, RAW_COLUMN};

/// Advisory join hint: a column name shared by two selected tables.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JoinHint {
    pub left_table: String,
    pub right_table: String,
    pub columns: Vec<String>,
}

/// Answer a natural-language question over the selected tables.
pub async fn ask(
    client: &GeminiClient,
    store: &Lakehouse,
    question: &str,
    tables: &[String],
) -> Result<Answer> {
    if tables.is_empty() {
        bail!(LakehouseError::Query("no tables selected".to_string()));
    }

    let mut schemas: Vec<(String, Vec<ColumnDef>)> = Vec::with_capacity(tables.len());
    for table in tables {
        schemas.push((table.clone(), store.describe(table).await?));
    }

    let hints = join_hints(&schemas);
    let prompt = build_prompt(question, &schemas, &hints);

    let response = client
        .generate(&[Part::Text(prompt)])
        .await
        .map_err(|e| LakehouseError::Generation(e.to_string()))?;

    let (sql, answer) = parse_analyst_response(&response)?;

    let result = store.query(&sql).await?;
    let answer = if answer.is_empty() {
        format!("Returned {} row(s).", result.rows.len())
    } else {
        answer
    };

    let chart = suggest_chart(&result);

    Ok(Answer {
        sql,
        answer,
        result,
        chart,
    })
}

/// CLI entry point: ask a question and print the SQL, answer, result rows,
/// and any suggested chart.
pub async fn run_ask(
    config: &crate::config::Config,
    session: &str,
    question: &str,
    tables: &[String],
) -> Result<()> {
    let sessions = crate::session::SessionManager::new(config);
    let store = sessions.open(session).await?;

    let tables = if tables.is_empty() {
        store
            .list_tables()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect()
    } else {
        tables.to_vec()
    };

    let client = GeminiClient::new(&config.model)?;
    let answer = ask(&client, &store, question, &tables).await?;

    println!("SQL: {}", answer.sql);
    println!();
    crate::manage::print_result(&answer.result);
    println!();
    println!("{}", answer.answer);
    if let Some(chart) = &answer.chart {
        let kind = match chart.kind {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
        };
        println!("Chart: {} (x={}, y={})", kind, chart.x, chart.y);
    }

    Ok(())
}

/// Identically named columns across each pair of selected tables, with the
/// shadow column excluded.
pub fn join_hints(schemas: &[(String, Vec<ColumnDef>)]) -> Vec<JoinHint> {
    let mut hints = Vec::new();

    for (i, (left, left_cols)) in schemas.iter().enumerate() {
        for (right, right_cols) in schemas.iter().skip(i + 1) {
            let mut shared: Vec<String> = left_cols
                .iter()
                .filter(|c| c.name != RAW_COLUMN)
                .filter(|c| right_cols.iter().any(|r| r.name == c.name))
                .map(|c| c.name.clone())
                .collect();
            shared.sort();
            if !shared.is_empty() {
                hints.push(JoinHint {
                    left_table: left.clone(),
                    right_table: right.clone(),
                    columns: shared,
                });
            }
        }
    }

    hints
}

fn build_prompt(
    question: &str,
    schemas: &[(String, Vec<ColumnDef>)],
    hints: &[JoinHint],
) -> String {
    let mut context = String::new();
    for (table, columns) in schemas {
        context.push_str(&format!("Table: {}\n", table));
        for col in columns {
            if col.name == RAW_COLUMN {
                continue;
            }
            context.push_str(&format!(
                "  {} ({})\n",
                col.name,
                col.column_type.semantic_name()
            ));
        }
        context.push('\n');
    }

    let mut hint_text = String::new();
    if !hints.is_empty() {
        hint_text.push_str("Likely join keys (advisory):\n");
        for h in hints {
            hint_text.push_str(&format!(
                "  {} <-> {} on: {}\n",
                h.left_table,
                h.right_table,
                h.columns.join(", ")
            ));
        }
        hint_text.push('\n');
    }

    format!(
        r#"You are an expert Data Analyst using SQLite SQL.

Available Tables and Schemas:
{context}{hint_text}User Question: {question}

Task: Generate a precise SQL query to answer the user's question, plus a one-line answer template.

Instructions:
- Use proper table and column names from the schema above
- For multi-table questions, use appropriate JOINs based on common columns
- Use aggregate functions (SUM, COUNT, AVG) when appropriate
- Add ORDER BY and LIMIT clauses for readability when listing data
- Exclude the raw_data column from SELECT unless specifically requested
- If the question is not about the available data, politely decline: you are a data analysis assistant

Output Format (JSON only, no markdown):
{{"sql": "SELECT ...", "answer": "One-line natural language answer"}}"#
    )
}

/// Parse the analyst response: a JSON object with `sql` and `answer`, or a
/// bare SQL statement as fallback. No extractable SQL is a total failure.
pub fn parse_analyst_response(response: &str) -> Result<(String, String)> {
    if let Some(value) = extract_json(response) {
        if let Some(sql) = value.get("sql").and_then(|v| v.as_str()) {
            let sql = sql.trim().trim_end_matches(';').to_string();
            if !sql.is_empty() {
                let answer = value
                    .get("answer")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                return Ok((sql, answer));
            }
        }
    }

    match extract_sql(response) {
        Some(sql) => Ok((sql, String::new())),
        None => bail!(LakehouseError::Generation(
            "model output contains no SQL statement".to_string()
        )),
    }
}

#[derive(Debug, PartialEq)]
enum ColumnShape {
    Numeric,
    DateLike,
    Categorical,
    Empty,
}

/// Derive a chart suggestion from a result's shape: a date-like column plus
/// a numeric column suggests a line chart, categorical + numeric a bar
/// chart, numeric + numeric a scatter plot. Results with no numeric column
/// (or no rows) get no chart.
pub fn suggest_chart(result: &QueryResult) -> Option<ChartSpec> {
    if result.is_empty() || result.columns.len() < 2 {
        return None;
    }

    let shapes: Vec<ColumnShape> = (0..result.columns.len())
        .map(|i| column_shape(result, i))
        .collect();

    let y = shapes.iter().position(|s| *s == ColumnShape::Numeric)?;

    if let Some(x) = shapes.iter().position(|s| *s == ColumnShape::DateLike) {
        return Some(ChartSpec {
            kind: ChartKind::Line,
            x: result.columns[x].clone(),
            y: result.columns[y].clone(),
        });
    }

    if let Some(x) = shapes.iter().position(|s| *s == ColumnShape::Categorical) {
        return Some(ChartSpec {
            kind: ChartKind::Bar,
            x: result.columns[x].clone(),
            y: result.columns[y].clone(),
        });
    }

    let x2 = shapes
        .iter()
        .enumerate()
        .position(|(i, s)| i != y && *s == ColumnShape::Numeric)?;
    Some(ChartSpec {
        kind: ChartKind::Scatter,
        x: result.columns[x2].clone(),
        y: result.columns[y].clone(),
    })
}

fn column_shape(result: &QueryResult, idx: usize) -> ColumnShape {
    let mut saw_number = false;
    let mut saw_date = false;
    let mut saw_text = false;

    for row in &result.rows {
        match row.get(idx) {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Number(_)) => saw_number = true,
            Some(serde_json::Value::String(s)) => {
                if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
                    saw_date = true;
                } else {
                    saw_text = true;
                }
            }
            Some(_) => saw_text = true,
        }
    }

    match (saw_number, saw_date, saw_text) {
        (true, false, false) => ColumnShape::Numeric,
        (false, true, false) => ColumnShape::DateLike,
        (false, false, false) => ColumnShape::Empty,
        _ => ColumnShape::Categorical,
    }
}
