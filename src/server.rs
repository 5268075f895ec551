//! HTTP JSON API for the lakehouse adapter.
//!
//! Exposes the three logical views — Ingest, Manage, Analyst — as JSON
//! endpoints driven by a browser UI or curl. One database file per session;
//! callers select a session with the `x-lakehouse-session` header (default
//! `default`).
//!
//! # Endpoints
//!
//! | Method   | Path               | Description |
//! |----------|--------------------|-------------|
//! | `POST`   | `/ingest/analyze`  | Extract schema + rows from one artifact |
//! | `POST`   | `/ingest/fix`      | Model-assisted row correction |
//! | `POST`   | `/ingest/load`     | Approve and load rows into a table |
//! | `GET`    | `/tables`          | List tables with row counts |
//! | `GET`    | `/tables/{name}`   | Describe one table |
//! | `DELETE` | `/tables/{name}`   | Drop one table |
//! | `DELETE` | `/tables`          | Drop all tables |
//! | `POST`   | `/query`           | Execute raw SQL |
//! | `POST`   | `/ask`             | Natural-language question → SQL → result |
//! | `DELETE` | `/session`         | Tear down the session's database file |
//! | `GET`    | `/health`          | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "query_error", "message": "no such table: missing" } }
//! ```
//!
//! Failures are returned inline and never retried; a failed action leaves
//! previously loaded tables untouched.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analyst;
use crate::config::Config;
use crate::error::LakehouseError;
use crate::extract;
use crate::gemini::GeminiClient;
use crate::models::{Answer, Artifact, ColumnDef, Extraction, QueryResult, RowSet, TableSummary};
use crate::session::SessionManager;
use crate::validate;

const SESSION_HEADER: &str = "x-lakehouse-session";
const DEFAULT_SESSION: &str = "default";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());
    let sessions = Arc::new(SessionManager::new(&config));

    let state = AppState { config, sessions };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest/analyze", post(handle_analyze))
        .route("/ingest/fix", post(handle_fix))
        .route("/ingest/load", post(handle_load))
        .route("/tables", get(handle_list_tables).delete(handle_clear_all))
        .route(
            "/tables/{name}",
            get(handle_describe).delete(handle_delete_table),
        )
        .route("/query", post(handle_query))
        .route("/ask", post(handle_ask))
        .route("/session", delete(handle_close_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Lakehouse server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Map pipeline failures to HTTP statuses via the typed taxonomy: query and
/// schema errors are the caller's problem, model failures are upstream.
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(le) = err.downcast_ref::<LakehouseError>() {
        let status = match le {
            LakehouseError::Query(_) => StatusCode::BAD_REQUEST,
            LakehouseError::SchemaConflict(_) => StatusCode::CONFLICT,
            LakehouseError::Extraction(_)
            | LakehouseError::Fix(_)
            | LakehouseError::Generation(_) => StatusCode::BAD_GATEWAY,
        };
        return AppError {
            status,
            code: le.code().to_string(),
            message: le.to_string(),
        };
    }

    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

fn model_client(state: &AppState) -> Result<GeminiClient, AppError> {
    GeminiClient::new(&state.config.model).map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "model_unavailable".to_string(),
        message: e.to_string(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    file_name: String,
    mime_type: String,
    /// Textual artifact content (CSV, JSON, plain text).
    #[serde(default)]
    text: Option<String>,
    /// Base64-encoded binary artifact (images).
    #[serde(default)]
    data_base64: Option<String>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Extraction>, AppError> {
    let artifact = match (&req.text, &req.data_base64) {
        (Some(text), None) => Artifact::Text {
            content: text.clone(),
        },
        (None, Some(b64)) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| bad_request(format!("invalid base64 payload: {}", e)))?;
            Artifact::from_bytes(&req.mime_type, bytes).map_err(|e| bad_request(e.to_string()))?
        }
        _ => {
            return Err(bad_request(
                "exactly one of 'text' or 'data_base64' must be provided",
            ))
        }
    };

    let client = model_client(&state)?;
    let mut extraction = extract::analyze_artifact(&client, &artifact, &req.file_name)
        .await
        .map_err(classify_error)?;

    // Merge locally detected issues with the model-reported ones
    for issue in validate::detect_issues(&extraction.schema.columns, &extraction.rows) {
        if !extraction.issues.contains(&issue) {
            extraction.issues.push(issue);
        }
    }

    Ok(Json(extraction))
}

// ============ POST /ingest/fix ============

#[derive(Deserialize)]
struct FixRequest {
    rows: RowSet,
    issues: Vec<String>,
}

#[derive(Serialize)]
struct FixResponse {
    rows: RowSet,
}

async fn handle_fix(
    State(state): State<AppState>,
    Json(req): Json<FixRequest>,
) -> Result<Json<FixResponse>, AppError> {
    if req.issues.is_empty() {
        return Err(bad_request("no issues to fix"));
    }

    let client = model_client(&state)?;
    let rows = validate::auto_fix(&client, &req.rows, &req.issues)
        .await
        .map_err(classify_error)?;

    Ok(Json(FixResponse { rows }))
}

// ============ POST /ingest/load ============

#[derive(Deserialize)]
struct LoadRequest {
    table: String,
    /// Approved (possibly human-edited) schema columns. Parsed structurally;
    /// content is trusted as-is.
    columns: Vec<ColumnDef>,
    rows: RowSet,
}

#[derive(Serialize)]
struct LoadResponse {
    table: String,
    inserted: u64,
}

async fn handle_load(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoadRequest>,
) -> Result<Json<LoadResponse>, AppError> {
    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    let inserted = store
        .load(&req.table, &req.columns, &req.rows)
        .await
        .map_err(classify_error)?;

    Ok(Json(LoadResponse {
        table: req.table,
        inserted,
    }))
}

// ============ GET /tables, DELETE /tables ============

#[derive(Serialize)]
struct TablesResponse {
    tables: Vec<TableSummary>,
}

async fn handle_list_tables(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TablesResponse>, AppError> {
    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    let tables = store.list_tables().await.map_err(classify_error)?;
    Ok(Json(TablesResponse { tables }))
}

async fn handle_clear_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    store.clear_all().await.map_err(classify_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ GET /tables/{name}, DELETE /tables/{name} ============

#[derive(Serialize)]
struct DescribeResponse {
    table: String,
    columns: Vec<ColumnDescription>,
}

#[derive(Serialize)]
struct ColumnDescription {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

async fn handle_describe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<DescribeResponse>, AppError> {
    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    let columns = store.describe(&name).await.map_err(classify_error)?;

    Ok(Json(DescribeResponse {
        table: name,
        columns: columns
            .into_iter()
            .map(|c| ColumnDescription {
                name: c.name,
                column_type: c.column_type.semantic_name().to_string(),
            })
            .collect(),
    }))
}

async fn handle_delete_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    store.delete(&name).await.map_err(classify_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
}

async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    if req.sql.trim().is_empty() {
        return Err(bad_request("sql must not be empty"));
    }

    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    let result = store.query(&req.sql).await.map_err(classify_error)?;
    Ok(Json(result))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    tables: Vec<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.tables.is_empty() {
        return Err(bad_request("at least one table must be selected"));
    }

    let store = state
        .sessions
        .open(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    let client = model_client(&state)?;
    let answer = analyst::ask(&client, &store, &req.question, &req.tables)
        .await
        .map_err(classify_error)?;

    Ok(Json(answer))
}

// ============ DELETE /session ============

async fn handle_close_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .close(&session_id(&headers))
        .await
        .map_err(classify_error)?;

    Ok(StatusCode::NO_CONTENT)
}
