//! Lakehouse store: evolvable dynamic tables over one SQLite file.
//!
//! Tables are created on first approved load with the proposed typed columns
//! plus a `raw_data JSON` shadow column holding the original record for
//! lossless recovery. Subsequent loads evolve the column set via
//! `ALTER TABLE ADD COLUMN` — columns are added, never removed. Type
//! conflicts between an existing declared column and new data are resolved
//! by widening: the value is bound as its text rendering and the declared
//! type stays as-is.
//!
//! Invariant: for every stored row, parsing `raw_data` yields a superset of
//! that row's typed-column values.

use anyhow::{bail, Result};
use base64::Engine;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};

use crate::db;
use crate::error::LakehouseError;
use crate::models::{is_valid_identifier, ColumnDef, ColumnType, QueryResult, RowSet, TableSummary};

/// Name of the untyped shadow column carrying the original record JSON.
pub const RAW_COLUMN: &str = "raw_data";

/// Handle to one session's lakehouse database.
pub struct Lakehouse {
    pool: SqlitePool,
    path: PathBuf,
}

impl Lakehouse {
    /// Open (creating if missing) the lakehouse at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Lakehouse> {
        let pool = db::connect(db_path).await?;
        Ok(Lakehouse {
            pool,
            path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the underlying pool. Call before deleting the database file.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Load a row set into `table`, creating or evolving it as needed.
    /// Returns the number of rows inserted.
    ///
    /// Column order: proposed columns first, then any fields observed in the
    /// rows but missing from the proposal (types inferred from values).
    pub async fn load(&self, table: &str, columns: &[ColumnDef], rows: &RowSet) -> Result<u64> {
        if !is_valid_identifier(table) {
            bail!(LakehouseError::SchemaConflict(format!(
                "invalid table name: '{}'",
                table
            )));
        }

        let desired = desired_columns(columns, rows)?;

        let existing = self.table_columns(table).await?;
        match existing {
            None => self.create_table(table, &desired).await?,
            Some(ref existing_cols) => {
                // Schema evolution: add columns the table does not have yet
                for col in &desired {
                    if !existing_cols.iter().any(|c| c.name == col.name) {
                        let sql = format!(
                            "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
                            table,
                            col.name,
                            col.column_type.sql_type()
                        );
                        sqlx::query(&sql).execute(&self.pool).await?;
                    }
                }
            }
        }

        // Insert against the table's full post-evolution column set so the
        // declared types (not the proposal's) drive value binding.
        let all_columns = self
            .table_columns(table)
            .await?
            .ok_or_else(|| anyhow::anyhow!("table vanished during load: {}", table))?;
        let typed: Vec<&ColumnDef> = all_columns
            .iter()
            .filter(|c| c.name != RAW_COLUMN)
            .collect();

        let placeholders = vec!["?"; typed.len() + 1].join(", ");
        let column_list = typed
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .chain(std::iter::once(format!("\"{}\"", RAW_COLUMN)))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table, column_list, placeholders
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in rows {
            let mut q = sqlx::query(&insert_sql);
            for col in &typed {
                q = bind_value(q, col.column_type, record.get(&col.name));
            }
            let raw = serde_json::to_string(record)?;
            q = q.bind(raw);
            q.execute(&mut *tx).await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// All user tables with their row counts.
    pub async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", name))
                .fetch_one(&self.pool)
                .await?;
            summaries.push(TableSummary { name, row_count });
        }

        Ok(summaries)
    }

    /// Ordered column list and semantic types for one table, including the
    /// `raw_data` shadow column.
    pub async fn describe(&self, table: &str) -> Result<Vec<ColumnDef>> {
        if !is_valid_identifier(table) {
            bail!(LakehouseError::Query(format!(
                "invalid table name: '{}'",
                table
            )));
        }
        match self.table_columns(table).await? {
            Some(cols) => Ok(cols),
            None => bail!(LakehouseError::Query(format!("no such table: {}", table))),
        }
    }

    /// Drop one table. Irreversible; dropping an absent table is a no-op.
    pub async fn delete(&self, table: &str) -> Result<()> {
        if !is_valid_identifier(table) {
            bail!(LakehouseError::Query(format!(
                "invalid table name: '{}'",
                table
            )));
        }
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop every user table.
    pub async fn clear_all(&self) -> Result<()> {
        for summary in self.list_tables().await? {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", summary.name))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Execute arbitrary SQL and return a tabular result. Engine errors are
    /// propagated verbatim as [`LakehouseError::Query`]; a failed query
    /// leaves existing tables untouched.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LakehouseError::Query(e.to_string()))?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }

        Ok(QueryResult { columns, rows: out })
    }

    /// Declared columns of `table`, or `None` if it does not exist.
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnDef>>> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
            .fetch_all(&self.pool)
            .await?;

        let cols = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let decl: String = row.get("type");
                ColumnDef {
                    name,
                    column_type: ColumnType::from_sql_type(&decl),
                    description: None,
                }
            })
            .collect();

        Ok(Some(cols))
    }

    async fn create_table(&self, table: &str, columns: &[ColumnDef]) -> Result<()> {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.column_type.sql_type()))
            .collect();
        defs.push(format!("\"{}\" JSON", RAW_COLUMN));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table,
            defs.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Union of the proposed columns and any fields present only in the rows,
/// in stable order. Rejects invalid identifiers and collisions with the
/// shadow column.
fn desired_columns(columns: &[ColumnDef], rows: &RowSet) -> Result<Vec<ColumnDef>> {
    let mut out: Vec<ColumnDef> = Vec::new();

    for col in columns {
        check_column_name(&col.name)?;
        if !out.iter().any(|c| c.name == col.name) {
            out.push(col.clone());
        }
    }

    for record in rows {
        for key in record.keys() {
            if out.iter().any(|c| c.name == *key) {
                continue;
            }
            check_column_name(key)?;
            out.push(ColumnDef {
                name: key.clone(),
                column_type: infer_column_type(key, rows),
                description: None,
            });
        }
    }

    Ok(out)
}

fn check_column_name(name: &str) -> Result<()> {
    if name == RAW_COLUMN {
        bail!(LakehouseError::SchemaConflict(format!(
            "column name '{}' collides with the raw-JSON shadow column",
            name
        )));
    }
    if !is_valid_identifier(name) {
        bail!(LakehouseError::SchemaConflict(format!(
            "invalid column name: '{}'",
            name
        )));
    }
    Ok(())
}

/// Infer a semantic type for a column from its observed values.
fn infer_column_type(name: &str, rows: &RowSet) -> ColumnType {
    let mut saw_int = false;
    let mut saw_float = false;
    let mut saw_bool = false;
    let mut saw_text = false;
    let mut saw_nested = false;

    for record in rows {
        match record.get(name) {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Bool(_)) => saw_bool = true,
            Some(serde_json::Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    saw_int = true;
                } else {
                    saw_float = true;
                }
            }
            Some(serde_json::Value::String(_)) => saw_text = true,
            Some(_) => saw_nested = true,
        }
    }

    if saw_nested {
        ColumnType::Json
    } else if saw_text {
        ColumnType::Text
    } else if saw_float {
        ColumnType::Double
    } else if saw_int {
        ColumnType::Integer
    } else if saw_bool {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

type SqliteQuery<'q> =
    sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind one loosely typed value under a declared column type. Values that
/// do not fit the declared type are widened to their text rendering rather
/// than rejected.
fn bind_value<'q>(
    q: SqliteQuery<'q>,
    column_type: ColumnType,
    value: Option<&serde_json::Value>,
) -> SqliteQuery<'q> {
    use serde_json::Value;

    let value = match value {
        None | Some(Value::Null) => return q.bind(None::<String>),
        Some(v) => v,
    };

    match column_type {
        ColumnType::Integer => match value {
            Value::Number(n) if n.is_i64() => q.bind(n.as_i64().unwrap_or_default()),
            Value::Number(n) => q.bind(n.as_f64().unwrap_or_default()),
            Value::Bool(b) => q.bind(i64::from(*b)),
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => q.bind(i),
                Err(_) => q.bind(s.clone()),
            },
            other => q.bind(other.to_string()),
        },
        ColumnType::Double => match value {
            Value::Number(n) => q.bind(n.as_f64().unwrap_or_default()),
            Value::Bool(b) => q.bind(f64::from(u8::from(*b))),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) => q.bind(f),
                Err(_) => q.bind(s.clone()),
            },
            other => q.bind(other.to_string()),
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => q.bind(i64::from(*b)),
            Value::Number(n) => q.bind(i64::from(n.as_f64().unwrap_or_default() != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => q.bind(1i64),
                "false" | "no" | "0" => q.bind(0i64),
                _ => q.bind(s.clone()),
            },
            other => q.bind(other.to_string()),
        },
        ColumnType::Text | ColumnType::Date => match value {
            Value::String(s) => q.bind(s.clone()),
            other => q.bind(other.to_string()),
        },
        ColumnType::Json => q.bind(value.to_string()),
    }
}

/// Decode one result row into JSON values using the engine's per-value
/// storage classes.
fn decode_row(row: &SqliteRow) -> Result<Vec<serde_json::Value>> {
    let mut out = Vec::with_capacity(row.columns().len());

    for i in 0..row.columns().len() {
        let (is_null, type_name) = {
            let raw = row.try_get_raw(i)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };

        let value = if is_null {
            serde_json::Value::Null
        } else {
            match type_name.as_str() {
                "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => serde_json::Value::from(row.try_get::<f64, _>(i)?),
                "BLOB" => serde_json::Value::String(
                    base64::engine::general_purpose::STANDARD
                        .encode(row.try_get::<Vec<u8>, _>(i)?),
                ),
                _ => serde_json::Value::String(row.try_get::<String, _>(i)?),
            }
        };
        out.push(value);
    }

    Ok(out)
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

    #[test]
    fn desired_columns_unions_proposal_and_rows() {
        let proposal = vec![ColumnDef {
            name: "item".to_string(),
            column_type: ColumnType::Text,
            description: None,
        }];
        let rows = rows_from(json!([{"item": "A", "qty": 3}]));
        let cols = desired_columns(&proposal, &rows).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "item");
        assert_eq!(cols[1].name, "qty");
        assert_eq!(cols[1].column_type, ColumnType::Integer);
    }

    #[test]
    fn desired_columns_rejects_shadow_collision() {
        let rows = rows_from(json!([{"raw_data": "x"}]));
        let err = desired_columns(&[], &rows).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LakehouseError>(),
            Some(LakehouseError::SchemaConflict(_))
        ));
    }

    #[test]
    fn desired_columns_rejects_bad_identifier() {
        let rows = rows_from(json!([{"Total Amount": 5}]));
        assert!(desired_columns(&[], &rows).is_err());
    }

    #[test]
    fn infer_prefers_wider_kinds() {
        let rows = rows_from(json!([
            {"a": 1, "b": 1.5, "c": true, "d": "x", "e": {"k": 1}},
            {"a": 2, "b": 2,   "c": false, "d": 3,  "e": [1]}
        ]));
        assert_eq!(infer_column_type("a", &rows), ColumnType::Integer);
        assert_eq!(infer_column_type("b", &rows), ColumnType::Double);
        assert_eq!(infer_column_type("c", &rows), ColumnType::Boolean);
        assert_eq!(infer_column_type("d", &rows), ColumnType::Text);
        assert_eq!(infer_column_type("e", &rows), ColumnType::Json);
    }

    #[test]
    fn infer_all_missing_defaults_to_text() {
        let rows = rows_from(json!([{"a": null}]));
        assert_eq!(infer_column_type("a", &rows), ColumnType::Text);
    }
}
