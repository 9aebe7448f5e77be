//! # CampusConnect
//!
//! Client library for the CampusConnect campus social network: REST calls
//! with normalized results, a real-time socket for chat and presence,
//! and background location updates for proximity matching.
//!
//! ## Modules
//!
//! - [`api`]: HTTP client wrapper and typed endpoints
//! - [`auth`]: Login, registration and session hydration
//! - [`session`]: Token persistence
//! - [`realtime`]: Socket connection manager and event bus
//! - [`chat`]: Conversations and open chat rooms
//! - [`location`]: Movement-gated location updates
//! - [`proximity`]: Nearby match notices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campusconnect::{ApiClient, AuthService, Config, FileSessionStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let store = Arc::new(FileSessionStore::open(config.session.path())?);
//!     let api = ApiClient::new(config.api.client_config(), store);
//!
//!     let auth = AuthService::new(api.clone());
//!     if auth.hydrate().await.is_none() {
//!         auth.login("ada@campus.edu", "hunter2").await?;
//!     }
//!
//!     match api.check_health().await {
//!         Ok(ok) => println!("backend up: {}", ok.data),
//!         Err(f) => println!("backend down: {}", f.message),
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod location;
pub mod logging;
pub mod proximity;
pub mod realtime;
pub mod session;

pub use api::{ApiClient, ApiClientConfig, ApiFailure, ApiResult, ApiSuccess};

pub use auth::{AuthError, AuthService, AuthState};

pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};

pub use realtime::{
    ConnectionManager, ConnectionState, RealtimeClient, RealtimeConfig, RealtimeError, Topic,
};

pub use chat::{ChatRoom, ConversationFeed, ConversationList, MessageList, SafetyNotice, SendOutcome};

pub use location::{GeoError, LocationGate, LocationPreference, LocationSample, LocationWatcher};

pub use proximity::{NearbyNotice, ProximityListener};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};
