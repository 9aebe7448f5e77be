//! Real-time Module
//!
//! Socket connection to the CampusConnect backend for push events (new
//! messages, presence, proximity matches) and client emits (register,
//! join/leave rooms, typing, location).
//!
//! # Example
//!
//! ```no_run
//! use campusconnect::realtime::{ConnectionManager, RealtimeConfig, Topic, UserRegistration};
//! use campusconnect::session::MemorySessionStore;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let manager = ConnectionManager::with_websocket(
//!     RealtimeConfig::default(),
//!     Arc::new(MemorySessionStore::new()),
//! );
//! let socket = manager.initialize(UserRegistration {
//!     user_id: "u1".to_string(),
//!     username: "ada@campus.edu".to_string(),
//! });
//! let mut messages = socket.on(Topic::NewMessage);
//! while let Some(event) = messages.recv().await {
//!     println!("{}", event.data);
//! }
//! # }
//! ```

mod bus;
mod client;
mod manager;
pub mod messages;
pub mod transport;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use client::{ConnectionState, PendingAck, RealtimeClient, RealtimeConfig};
pub use manager::ConnectionManager;
pub use messages::{
    OutgoingMessage, ProximityMatch, RoomAck, ServerEvent, Topic, TypingIndicator,
    UserRegistration, UserStatus,
};
pub use transport::{Connector, MemoryConnector, WsConnector};

use thiserror::Error;

/// Errors raised by the socket layer
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("socket connection failed: {0}")]
    Connect(String),

    #[error("socket not initialized")]
    NotInitialized,
}
