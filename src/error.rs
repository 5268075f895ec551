//! Failure taxonomy shared across the ingestion and analyst pipelines.
//!
//! Every variant maps to one failure mode the caller can act on. Errors are
//! carried inside `anyhow::Error` through the pipeline and recovered with
//! `downcast_ref` at the HTTP boundary to pick a status code.

/// Typed failure raised by the extraction, validation, storage, and analyst
/// components. Nothing here is fatal to the process; a failed action leaves
/// previously loaded tables untouched.
#[derive(Debug)]
pub enum LakehouseError {
    /// Model call or response parse failed during document ingestion.
    Extraction(String),
    /// Auto-correction could not produce a usable row set.
    Fix(String),
    /// Irreconcilable schema conflict (reserved column collision or an
    /// identifier the store refuses to create).
    SchemaConflict(String),
    /// SQL execution failure, propagated verbatim from the engine.
    Query(String),
    /// No SQL statement could be extracted from the model output.
    Generation(String),
}

impl std::fmt::Display for LakehouseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LakehouseError::Extraction(e) => write!(f, "extraction failed: {}", e),
            LakehouseError::Fix(e) => write!(f, "auto-fix failed: {}", e),
            LakehouseError::SchemaConflict(e) => write!(f, "schema conflict: {}", e),
            LakehouseError::Query(e) => write!(f, "query failed: {}", e),
            LakehouseError::Generation(e) => write!(f, "no SQL in model output: {}", e),
        }
    }
}

impl std::error::Error for LakehouseError {}

impl LakehouseError {
    /// Machine-readable code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            LakehouseError::Extraction(_) => "extraction_failure",
            LakehouseError::Fix(_) => "fix_failure",
            LakehouseError::SchemaConflict(_) => "schema_conflict",
            LakehouseError::Query(_) => "query_error",
            LakehouseError::Generation(_) => "generation_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = LakehouseError::Query("no such table: missing".to_string());
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn codes_are_distinct() {
        let variants = [
            LakehouseError::Extraction(String::new()),
            LakehouseError::Fix(String::new()),
            LakehouseError::SchemaConflict(String::new()),
            LakehouseError::Query(String::new()),
            LakehouseError::Generation(String::new()),
        ];
        let codes: std::collections::HashSet<_> = variants.iter().map(|v| v.code()).collect();
        assert_eq!(codes.len(), variants.len());
    }

    #[test]
    fn survives_anyhow_downcast() {
        let err: anyhow::Error = LakehouseError::Generation("free text only".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<LakehouseError>(),
            Some(LakehouseError::Generation(_))
        ));
    }
}
