//! Lakehouse management commands: init, tables, describe, drop, query,
//! export, and session lifecycle. Thin printing wrappers over the store.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::export;
use crate::models::QueryResult;
use crate::session::SessionManager;

pub async fn run_init(config: &Config, session: &str) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;
    println!("Lakehouse initialized at {}", store.path().display());
    Ok(())
}

pub async fn run_tables(config: &Config, session: &str) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;
    let tables = store.list_tables().await?;

    if tables.is_empty() {
        println!("No tables.");
        return Ok(());
    }

    println!("{:<32} {:>10}", "TABLE", "ROWS");
    println!("{}", "-".repeat(43));
    for t in &tables {
        println!("{:<32} {:>10}", t.name, t.row_count);
    }

    Ok(())
}

pub async fn run_describe(config: &Config, session: &str, table: &str) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;
    let columns = store.describe(table).await?;

    println!("{:<32} {:<10}", "COLUMN", "TYPE");
    println!("{}", "-".repeat(43));
    for c in &columns {
        println!("{:<32} {:<10}", c.name, c.column_type.semantic_name());
    }

    Ok(())
}

pub async fn run_drop(config: &Config, session: &str, table: Option<&str>, all: bool) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;

    match (table, all) {
        (Some(name), false) => {
            store.delete(name).await?;
            println!("Dropped table '{}'.", name);
        }
        (None, true) => {
            store.clear_all().await?;
            println!("Dropped all tables.");
        }
        _ => anyhow::bail!("specify a table name or --all"),
    }

    Ok(())
}

pub async fn run_query(config: &Config, session: &str, sql: &str) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;
    let result = store.query(sql).await?;
    print_result(&result);
    Ok(())
}

/// Export a full table as CSV to a file or stdout.
pub async fn run_export(
    config: &Config,
    session: &str,
    table: &str,
    output: Option<&Path>,
) -> Result<()> {
    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;

    // describe() validates the identifier and 404s a missing table before we
    // interpolate the name into SQL
    store.describe(table).await?;
    let result = store.query(&format!("SELECT * FROM \"{}\"", table)).await?;
    let csv = export::query_result_to_csv(&result);

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &csv)?;
            eprintln!(
                "Exported {} row(s) from '{}' to {}",
                result.rows.len(),
                table,
                path.display()
            );
        }
        None => print!("{}", csv),
    }

    Ok(())
}

pub fn run_session_list(config: &Config) -> Result<()> {
    let sessions = SessionManager::new(config);
    let list = sessions.list()?;

    if list.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for session in list {
        println!("{}", session);
    }

    Ok(())
}

pub async fn run_session_close(config: &Config, session: &str) -> Result<()> {
    let sessions = SessionManager::new(config);
    sessions.close(session).await?;
    println!("Session '{}' removed.", session);
    Ok(())
}

/// Print a query result as aligned columns.
pub fn print_result(result: &QueryResult) {
    if result.rows.is_empty() {
        println!("No rows.");
        return;
    }

    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<w$}", c, w = widths[i]))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));

    for row in &rendered {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<w$}", cell, w = widths.get(i).copied().unwrap_or(0)))
            .collect();
        println!("{}", line.join("  "));
    }

    println!("({} row(s))", result.rows.len());
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
