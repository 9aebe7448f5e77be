//! CampusConnect REST API
//!
//! HTTP layer of the client, built on reqwest.
//!
//! Every call returns an [`ApiResult`]; callers branch on it instead of
//! handling raised errors. The bearer token is read from a
//! [`crate::session::SessionStore`] on each request.
//!
//! # Resources
//!
//! - `auth` - current user
//! - `users` - profiles, directory, settings, location updates
//! - `matching` - recommendations and AI proposals
//! - `connections` - requests, accept/reject, status
//! - `groups` / `events` - listings, membership, RSVPs, admin review
//! - `help` / `onboarding` - categories and AI assistant
//! - `chat` - conversations and messages
//! - `safety` - content moderation check
//! - `admin` - user management, analytics, geofence settings
//!
//! # Example
//!
//! ```rust,no_run
//! use campusconnect::api::{ApiClient, ApiClientConfig};
//! use campusconnect::session::MemorySessionStore;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let client = ApiClient::new(ApiClientConfig::default(), Arc::new(MemorySessionStore::new()));
//! match client.check_health().await {
//!     Ok(ok) => println!("backend up: {}", ok.data),
//!     Err(e) => eprintln!("backend down: {}", e.message),
//! }
//! # }
//! ```

mod client;
pub mod dto;
pub mod endpoints;
mod error;

pub use client::{ApiClient, ApiClientConfig};
pub use error::{ApiFailure, ApiResult, ApiSuccess, DEFAULT_ERROR_MESSAGE, NETWORK_ERROR_MESSAGE};
