use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use lakehouse_adapter::error::LakehouseError;
use lakehouse_adapter::models::{ColumnDef, ColumnType, Record, RowSet};
use lakehouse_adapter::store::Lakehouse;

fn lake_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lake");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[model]
name = "gemini-1.5-flash"
api_key_env = "GEMINI_API_KEY"
timeout_secs = 120

[db]
data_dir = "{}/data"

[server]
bind = "127.0.0.1:7410"
"#,
        root.display()
    );

    let config_path = config_dir.join("lake.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lake(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lake_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lake binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
    let mut map = Record::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    map
}

fn col(name: &str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        column_type,
        description: None,
    }
}

fn sales_rows() -> RowSet {
    vec![
        record(&[
            ("item", serde_json::json!("apple")),
            ("qty", serde_json::json!(3)),
        ]),
        record(&[
            ("item", serde_json::json!("pear")),
            ("qty", serde_json::json!(5)),
        ]),
    ]
}

fn sales_columns() -> Vec<ColumnDef> {
    vec![col("item", ColumnType::Text), col("qty", ColumnType::Integer)]
}

// ---------------------------------------------------------------------------
// Store properties (library level)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_then_query_sum() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    let inserted = store
        .load("sales", &sales_columns(), &sales_rows())
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let columns = store.describe("sales").await.unwrap();
    let types: Vec<(&str, &str)> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.column_type.semantic_name()))
        .collect();
    assert!(types.contains(&("item", "string")));
    assert!(types.contains(&("qty", "integer")));
    assert!(types.contains(&("raw_data", "json")));

    let result = store
        .query("SELECT SUM(qty) AS total FROM sales")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["total"]);
    assert_eq!(result.rows[0][0], serde_json::json!(8));
}

#[tokio::test]
async fn double_load_appends_and_preserves_raw_data() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    let columns = sales_columns();
    let rows = sales_rows();
    store.load("sales", &columns, &rows).await.unwrap();
    store.load("sales", &columns, &rows).await.unwrap();

    let tables = store.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "sales");
    assert_eq!(tables[0].row_count, 4);

    // Every stored record must be recoverable from the shadow column.
    let result = store
        .query("SELECT raw_data FROM sales ORDER BY item, qty")
        .await
        .unwrap();
    for row in &result.rows {
        let raw = row[0].as_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_object());
        assert!(parsed.get("item").is_some());
        assert!(parsed.get("qty").is_some());
    }
}

#[tokio::test]
async fn evolution_adds_column_and_backfills_null() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    store
        .load("sales", &sales_columns(), &sales_rows())
        .await
        .unwrap();

    let wider = vec![
        col("item", ColumnType::Text),
        col("qty", ColumnType::Integer),
        col("price", ColumnType::Double),
    ];
    let new_rows = vec![record(&[
        ("item", serde_json::json!("fig")),
        ("qty", serde_json::json!(1)),
        ("price", serde_json::json!(2.5)),
    ])];
    store.load("sales", &wider, &new_rows).await.unwrap();

    // Old rows survive with NULL in the new column.
    let result = store
        .query("SELECT COUNT(*) AS n FROM sales WHERE price IS NULL")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], serde_json::json!(2));

    let result = store
        .query("SELECT price FROM sales WHERE item = 'fig'")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], serde_json::json!(2.5));
}

#[tokio::test]
async fn type_conflict_widens_to_text_without_losing_rows() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    store
        .load("sales", &sales_columns(), &sales_rows())
        .await
        .unwrap();

    // qty arrives as a non-numeric string in a later batch.
    let odd_rows = vec![record(&[
        ("item", serde_json::json!("mystery")),
        ("qty", serde_json::json!("a few")),
    ])];
    store.load("sales", &sales_columns(), &odd_rows).await.unwrap();

    let result = store
        .query("SELECT qty FROM sales WHERE item = 'mystery'")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], serde_json::json!("a few"));

    // Numeric rows still aggregate.
    let result = store
        .query("SELECT SUM(qty) AS total FROM sales WHERE item != 'mystery'")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], serde_json::json!(8));
}

#[tokio::test]
async fn bad_sql_is_query_error_and_leaves_tables_intact() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    store
        .load("sales", &sales_columns(), &sales_rows())
        .await
        .unwrap();

    let err = store.query("SELECT nope FROM missing").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LakehouseError>(),
        Some(LakehouseError::Query(_))
    ));

    let tables = store.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].row_count, 2);
}

#[tokio::test]
async fn delete_and_clear_all() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    store
        .load("sales", &sales_columns(), &sales_rows())
        .await
        .unwrap();
    store
        .load("returns", &sales_columns(), &sales_rows())
        .await
        .unwrap();

    store.delete("sales").await.unwrap();
    let names: Vec<String> = store
        .list_tables()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["returns"]);

    store.clear_all().await.unwrap();
    assert!(store.list_tables().await.unwrap().is_empty());
}

#[tokio::test]
async fn describe_missing_table_fails() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    let err = store.describe("ghost").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LakehouseError>(),
        Some(LakehouseError::Query(_))
    ));
}

#[tokio::test]
async fn raw_data_column_name_is_reserved() {
    let tmp = TempDir::new().unwrap();
    let store = Lakehouse::open(&tmp.path().join("lake.sqlite")).await.unwrap();

    let columns = vec![col("raw_data", ColumnType::Text)];
    let rows = vec![record(&[("raw_data", serde_json::json!("x"))])];
    let err = store.load("t", &columns, &rows).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LakehouseError>(),
        Some(LakehouseError::SchemaConflict(_))
    ));
}

// ---------------------------------------------------------------------------
// CLI (binary level, offline commands only)
// ---------------------------------------------------------------------------

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lake(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("lakehouse_default.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lake(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_lake(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_tables_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_lake(&config_path, &["init"]);
    let (stdout, _, success) = run_lake(&config_path, &["tables"]);
    assert!(success);
    assert!(stdout.contains("No tables."));
}

#[test]
fn test_query_without_tables_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();

    run_lake(&config_path, &["init"]);
    let (_, stderr, success) = run_lake(&config_path, &["query", "SELECT * FROM nothing"]);
    assert!(!success);
    assert!(stderr.contains("query failed"), "stderr: {}", stderr);
}

#[test]
fn test_describe_missing_table_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();

    run_lake(&config_path, &["init"]);
    let (_, stderr, success) = run_lake(&config_path, &["describe", "ghost"]);
    assert!(!success);
    assert!(stderr.contains("query failed"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_without_api_key_fails_cleanly() {
    let (tmp, config_path) = setup_test_env();

    let doc = tmp.path().join("notes.txt");
    fs::write(&doc, "item,qty\napple,3\npear,5\n").unwrap();

    run_lake(&config_path, &["init"]);
    let (_, stderr, success) = run_lake(&config_path, &["ingest", doc.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("GEMINI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_session_isolation() {
    let (tmp, config_path) = setup_test_env();

    run_lake(&config_path, &["init", "--session", "alpha"]);
    run_lake(&config_path, &["init", "--session", "beta"]);

    let data_dir = tmp.path().join("data");
    assert!(data_dir.join("lakehouse_alpha.sqlite").exists());
    assert!(data_dir.join("lakehouse_beta.sqlite").exists());

    let (stdout, _, success) = run_lake(&config_path, &["session", "list"]);
    assert!(success);
    assert!(stdout.contains("alpha"));
    assert!(stdout.contains("beta"));
}

#[test]
fn test_session_close_removes_file() {
    let (tmp, config_path) = setup_test_env();

    run_lake(&config_path, &["init", "--session", "scratch"]);
    let file = tmp.path().join("data").join("lakehouse_scratch.sqlite");
    assert!(file.exists());

    let (stdout, _, success) = run_lake(&config_path, &["session", "close", "--session", "scratch"]);
    assert!(success, "close failed: {}", stdout);
    assert!(!file.exists());
}

#[test]
fn test_session_new_prints_id() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lake(&config_path, &["session", "new"]);
    assert!(success);
    assert!(!stdout.trim().is_empty());
}

#[test]
fn test_bad_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("lake.toml");
    fs::write(
        &config_path,
        r#"[model]
name = "not-a-real-model"

[db]
data_dir = "data"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_lake(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("not-a-real-model"), "stderr: {}", stderr);
}
