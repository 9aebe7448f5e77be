//! Session Storage
//!
//! Persistent key/value storage for the bearer token and small cached
//! preferences. The HTTP client and the auth service only see the
//! [`SessionStore`] trait, so tests can swap in [`MemorySessionStore`].

mod store;

pub use store::{FileSessionStore, MemorySessionStore, TOKEN_KEY};

use thiserror::Error;

/// Storage for the current bearer token
pub trait SessionStore: Send + Sync {
    /// Current token, if one is stored
    fn get(&self) -> Option<String>;

    /// Store a token, replacing any previous one
    fn set(&self, token: &str) -> Result<(), SessionError>;

    /// Remove the stored token
    fn clear(&self) -> Result<(), SessionError>;
}

/// Errors raised by session storage
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to access session file {path:?}: {error}")]
    Io {
        path: std::path::PathBuf,
        error: String,
    },

    #[error("Corrupt session file {path:?}: {error}")]
    Corrupt {
        path: std::path::PathBuf,
        error: String,
    },
}
