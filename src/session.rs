//! Session lifecycle: one database file per session.
//!
//! Each session id maps to its own SQLite file under the configured data
//! directory, isolating tables between concurrent users. Handles are created
//! and torn down explicitly — there is no ambient session context.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::store::Lakehouse;

const FILE_PREFIX: &str = "lakehouse_";
const FILE_SUFFIX: &str = ".sqlite";

/// Explicit session-id → store-handle pool.
pub struct SessionManager {
    data_dir: PathBuf,
    handles: Mutex<HashMap<String, Arc<Lakehouse>>>,
}

impl SessionManager {
    pub fn new(config: &Config) -> SessionManager {
        SessionManager {
            data_dir: config.db.data_dir.clone(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn db_path(&self, session: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}{}", FILE_PREFIX, session, FILE_SUFFIX))
    }

    /// Open (creating on first use) the store for `session`. Ids are
    /// restricted to identifier-safe characters since they become part of a
    /// filename.
    pub async fn open(&self, session: &str) -> Result<Arc<Lakehouse>> {
        if !is_session_id(session) {
            bail!("invalid session id: '{}'", session);
        }

        let mut handles = self.handles.lock().await;
        if let Some(store) = handles.get(session) {
            return Ok(store.clone());
        }

        let store = Arc::new(Lakehouse::open(&self.db_path(session)).await?);
        handles.insert(session.to_string(), store.clone());
        Ok(store)
    }

    /// Tear down one session: close the pool and delete its database file
    /// (including the WAL sidecar files). Irreversible.
    pub async fn close(&self, session: &str) -> Result<()> {
        if !is_session_id(session) {
            bail!("invalid session id: '{}'", session);
        }

        let handle = self.handles.lock().await.remove(session);
        if let Some(store) = handle {
            match Arc::try_unwrap(store) {
                Ok(store) => store.close().await,
                Err(_) => bail!("session '{}' still in use", session),
            }
        }

        let path = self.db_path(session);
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.clone().into_os_string();
            p.push(suffix);
            let p = PathBuf::from(p);
            if p.exists() {
                std::fs::remove_file(&p)?;
            }
        }

        Ok(())
    }

    /// Enumerate sessions with a database file on disk.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        if !self.data_dir.exists() {
            return Ok(sessions);
        }

        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix(FILE_PREFIX) {
                if let Some(session) = rest.strip_suffix(FILE_SUFFIX) {
                    sessions.push(session.to_string());
                }
            }
        }

        sessions.sort();
        Ok(sessions)
    }
}

/// Session ids are UUIDs or simple names; both must be filename-safe.
fn is_session_id(session: &str) -> bool {
    !session.is_empty()
        && session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
