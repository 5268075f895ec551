use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Model identifiers the adapter knows how to talk to.
pub const KNOWN_MODELS: [&str; 2] = ["gemini-1.5-flash", "gemini-1.5-pro"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Generative-model settings. The API key itself is read from the
/// environment at client construction and is never stored in the file.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_name() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Session database settings. Each session gets its own SQLite file
/// `lakehouse_<session>.sqlite` under `data_dir`.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Minimal config for tests and offline commands: caller-supplied data
    /// dir, default model settings.
    pub fn minimal(data_dir: impl Into<PathBuf>) -> Config {
        Config {
            model: ModelConfig::default(),
            db: DbConfig {
                data_dir: data_dir.into(),
            },
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if !KNOWN_MODELS.contains(&config.model.name.as_str()) {
        anyhow::bail!(
            "Unknown model: '{}'. Must be one of: {}",
            config.model.name,
            KNOWN_MODELS.join(", ")
        );
    }

    if config.model.api_key_env.is_empty() {
        anyhow::bail!("model.api_key_env must not be empty");
    }

    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }

    if config.db.data_dir.as_os_str().is_empty() {
        anyhow::bail!("db.data_dir must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("lake.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_full_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[model]
name = "gemini-1.5-pro"
api_key_env = "GEMINI_API_KEY"
timeout_secs = 60

[db]
data_dir = "./data"

[server]
bind = "127.0.0.1:9000"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model.name, "gemini-1.5-pro");
        assert_eq!(cfg.model.timeout_secs, 60);
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
    }

    #[test]
    fn defaults_apply() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[model]

[db]
data_dir = "./data"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model.name, "gemini-1.5-flash");
        assert_eq!(cfg.model.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.server.bind, default_bind());
    }

    #[test]
    fn rejects_unknown_model() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[model]
name = "gpt-4o"

[db]
data_dir = "./data"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
