//! Ingestion pipeline orchestration for the CLI.
//!
//! Coordinates the full flow: read artifact → model extraction → issue
//! detection → optional auto-fix → approval gate → load into the session
//! store. Each step performs at most one blocking external call and failures
//! surface immediately; nothing is retried.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::extract;
use crate::gemini::GeminiClient;
use crate::models::{Artifact, RowSet};
use crate::session::SessionManager;
use crate::validate;

/// Guess a MIME type from the file extension, matching the upload types the
/// ingest surface accepts.
pub fn guess_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_ingest(
    config: &Config,
    session: &str,
    file: &Path,
    table_override: Option<String>,
    rows_file: Option<&Path>,
    auto_fix: bool,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let bytes = std::fs::read(file)?;
    let mime_type = guess_mime_type(file);
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let artifact = Artifact::from_bytes(mime_type, bytes)?;
    let client = GeminiClient::new(&config.model)?;

    println!(
        "analyzing {} ({}) with {}",
        file_name,
        mime_type,
        client.model_name()
    );
    let mut extraction = extract::analyze_artifact(&client, &artifact, &file_name).await?;

    let table = table_override.unwrap_or_else(|| extraction.schema.table_name.clone());

    // Human override: the edited rows replace the extracted ones verbatim,
    // subject only to a structural JSON parse
    if let Some(path) = rows_file {
        let content = std::fs::read_to_string(path)?;
        let rows: RowSet = serde_json::from_str(&content)?;
        println!("  rows replaced from {} ({})", path.display(), rows.len());
        extraction.rows = rows;
        // Model-flagged issues describe the discarded rows
        extraction.issues.clear();
    }

    println!("  document type: {}", extraction.document_type);
    println!("  proposed table: {}", table);
    println!("  columns: {}", extraction.schema.columns.len());
    println!("  rows: {}", extraction.rows.len());

    // Merge locally detected issues with the model-reported ones
    let mut issues = extraction.issues.clone();
    for issue in validate::detect_issues(&extraction.schema.columns, &extraction.rows) {
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }

    if !issues.is_empty() {
        println!("  issues:");
        for issue in &issues {
            println!("    - {}", issue);
        }

        if auto_fix {
            println!("auto-fixing {} issue(s)", issues.len());
            extraction.rows = validate::auto_fix(&client, &extraction.rows, &issues).await?;
            issues = validate::detect_issues(&extraction.schema.columns, &extraction.rows);
            if issues.is_empty() {
                println!("  all issues resolved");
            } else {
                println!("  {} issue(s) remain after fix", issues.len());
            }
        }
    }

    if !issues.is_empty() && !force {
        bail!(
            "{} unresolved issue(s); rerun with --auto-fix or --force to load anyway",
            issues.len()
        );
    }

    if dry_run {
        println!("dry-run: nothing loaded");
        return Ok(());
    }

    let sessions = SessionManager::new(config);
    let store = sessions.open(session).await?;
    let inserted = store
        .load(&table, &extraction.schema.columns, &extraction.rows)
        .await?;

    println!("loaded {} row(s) into '{}'", inserted, table);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime_type(Path::new("invoice.JPG")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("a/b/report.csv")), "text/csv");
        assert_eq!(
            guess_mime_type(Path::new("inventory.json")),
            "application/json"
        );
        assert_eq!(guess_mime_type(Path::new("notes")), "text/plain");
    }
}
