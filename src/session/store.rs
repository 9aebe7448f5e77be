//! Session store implementations

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{SessionError, SessionStore};

/// Key the bearer token is stored under
pub const TOKEN_KEY: &str = "jwt";

/// In-memory token store, lost when dropped
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a token
    pub fn with_token(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(token.to_string())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set(&self, token: &str) -> Result<(), SessionError> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// JSON file backed key/value store
///
/// Holds the token under [`TOKEN_KEY`] plus any cached preferences. Every
/// write rewrites the whole file; reads are served from memory.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    items: RwLock<Map<String, Value>>,
}

impl FileSessionStore {
    /// Open the store at `path`, starting empty when the file is missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let items = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| SessionError::Io {
                path: path.clone(),
                error: e.to_string(),
            })?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content).map_err(|e| SessionError::Corrupt {
                    path: path.clone(),
                    error: e.to_string(),
                })?
            }
        } else {
            Map::new()
        };

        tracing::debug!(path = ?path, items = items.len(), "Opened session store");

        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    /// Default location under the platform data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join("campusconnect").join("session.json"))
            .unwrap_or_else(|| PathBuf::from("./campusconnect_session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a raw item
    pub fn get_item(&self, key: &str) -> Option<Value> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Write a raw item and persist
    pub fn set_item(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.insert(key.to_string(), value);
        self.persist(&items)
    }

    /// Remove a raw item and persist
    pub fn remove_item(&self, key: &str) -> Result<(), SessionError> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        if items.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&items)
    }

    /// Cached location preference, if one was saved
    pub fn location_enabled(&self) -> Option<bool> {
        self.get_item("location_enabled").and_then(|v| v.as_bool())
    }

    pub fn set_location_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.set_item("location_enabled", Value::Bool(enabled))
    }

    fn persist(&self, items: &Map<String, Value>) -> Result<(), SessionError> {
        let io_err = |e: std::io::Error| SessionError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(items).map_err(|e| SessionError::Corrupt {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(io_err)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        self.get_item(TOKEN_KEY)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn set(&self, token: &str) -> Result<(), SessionError> {
        self.set_item(TOKEN_KEY, Value::String(token.to_string()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.remove_item(TOKEN_KEY)
    }
}
