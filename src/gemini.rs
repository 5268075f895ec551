//! Gemini `generateContent` client and best-effort output parsing.
//!
//! One outbound HTTPS call per request, no retry: a failed or malformed
//! response is surfaced to the caller as a total failure, never partially
//! parsed. The API key is read from the environment variable named in
//! `[model] api_key_env` at client construction.
//!
//! Model responses are free text with an embedded JSON object or SQL
//! statement; [`extract_json`] and [`extract_sql`] pull those out without
//! assuming any guaranteed grammar (code fences, prose framing, and trailing
//! commentary are all tolerated).

use anyhow::{bail, Result};
use base64::Engine;
use std::time::Duration;

use crate::config::ModelConfig;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One part of a Gemini request: inline text or base64-encoded image bytes.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    InlineImage { mime_type: String, bytes: Vec<u8> },
}

/// Thin client over the Gemini REST API.
pub struct GeminiClient {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// Fails if the configured environment variable does not hold an API key.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.name.clone(),
            api_key,
            http,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send one prompt (text and/or inline image parts) and return the
    /// model's text response. Temperature is pinned to 0 for determinism.
    pub async fn generate(&self, parts: &[Part]) -> Result<String> {
        let json_parts: Vec<serde_json::Value> = parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => serde_json::json!({ "text": t }),
                Part::InlineImage { mime_type, bytes } => serde_json::json!({
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                    }
                }),
            })
            .collect();

        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": json_parts }],
            "generationConfig": { "temperature": 0 },
        });

        let url = format!("{}/{}:generateContent", API_BASE, self.model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_generate_response(&json)
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
    }

    if text.is_empty() {
        bail!("Invalid Gemini response: empty candidate text");
    }

    Ok(text)
}

/// Strip Markdown code fences (```json, ```sql, bare ```) from model output.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Best-effort extraction of the first JSON object or array embedded in
/// free text. Returns `None` when no balanced JSON value parses.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let cleaned = strip_fences(text);

    // Fast path: the whole response is JSON
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&cleaned) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    // Scan for the first balanced {...} or [...] span
    let bytes = cleaned.as_bytes();
    let start = cleaned.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&cleaned[start..=i]).ok();
                }
            }
            _ => {}
        }
    }

    None
}

/// Best-effort extraction of a single SQL statement from free text.
/// Accepts fenced or bare output; the statement must start with `SELECT`
/// or `WITH`. Returns `None` if nothing SQL-shaped is found.
pub fn extract_sql(text: &str) -> Option<String> {
    let cleaned = strip_fences(text);

    let upper = cleaned.to_ascii_uppercase();
    let select = upper.find("SELECT")?;
    // A CTE prefix only counts when WITH begins the text or a line;
    // the bare word "with" in prose must not trigger extraction.
    let start = upper[..select]
        .rfind("WITH")
        .filter(|&w| w == 0 || upper.as_bytes()[w - 1] == b'\n')
        .unwrap_or(select);

    // Take through the first terminating semicolon, or to the end
    let rest = &cleaned[start..];
    let stmt = match rest.find(';') {
        Some(end) => &rest[..end],
        None => rest,
    };

    let stmt = stmt.trim();
    if stmt.is_empty() {
        None
    } else {
        Some(stmt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_concatenates_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] }
            }]
        });
        assert_eq!(parse_generate_response(&json).unwrap(), "hello world");
    }

    #[test]
    fn parse_response_rejects_empty() {
        let json = serde_json::json!({ "candidates": [] });
        assert!(parse_generate_response(&json).is_err());
    }

    #[test]
    fn extract_json_fenced() {
        let text = "Here is the result:\n```json\n{\"table_name\": \"sales\", \"data\": []}\n```\nDone.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["table_name"], "sales");
    }

    #[test]
    fn extract_json_embedded_in_prose() {
        let text = "Sure! The schema is {\"columns\": [{\"name\": \"qty\"}]} as requested.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["columns"][0]["name"], "qty");
    }

    #[test]
    fn extract_json_array() {
        let text = "```json\n[{\"a\": 1}, {\"a\": 2}]\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn extract_json_handles_braces_in_strings() {
        let text = r#"{"note": "use {curly} braces", "n": 1} trailing"#;
        let v = extract_json(text).unwrap();
        assert_eq!(v["n"], 1);
    }

    #[test]
    fn extract_json_none_for_prose() {
        assert!(extract_json("I cannot answer that question.").is_none());
    }

    #[test]
    fn extract_sql_fenced() {
        let text = "```sql\nSELECT SUM(qty) FROM sales;\n```";
        assert_eq!(extract_sql(text).unwrap(), "SELECT SUM(qty) FROM sales");
    }

    #[test]
    fn extract_sql_bare_with_prose() {
        let text = "Here you go:\nSELECT item, qty FROM sales ORDER BY qty DESC";
        assert_eq!(
            extract_sql(text).unwrap(),
            "SELECT item, qty FROM sales ORDER BY qty DESC"
        );
    }

    #[test]
    fn extract_sql_with_cte() {
        let text = "WITH t AS (SELECT 1 AS x) SELECT x FROM t";
        assert!(extract_sql(text).unwrap().starts_with("WITH t AS"));
    }

    #[test]
    fn extract_sql_none_for_prose() {
        assert!(extract_sql("I'm a data analysis assistant and cannot help with that.").is_none());
    }
}
