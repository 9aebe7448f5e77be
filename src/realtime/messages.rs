//! Real-time Message Types
//!
//! Frames exchanged over the socket. Every frame is a JSON object
//! `{"event": <name>, "data": <payload>, "ack": <id>?}`; acknowledgements
//! come back as `{"event": "ack", "ack": <id>, "data": {"ok": .., "error": ..}}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Event name of acknowledgement frames
pub const ACK_EVENT: &str = "ack";

/// Events emitted by the client
pub mod client_events {
    pub const USER_REGISTER: &str = "user:register";
    pub const SEND_MESSAGE: &str = "chat:send-message";
    pub const JOIN_CONVERSATION: &str = "chat:join-conversation";
    pub const LEAVE_CONVERSATION: &str = "chat:leave-conversation";
    pub const LOCATION_UPDATE: &str = "location:update";
    pub const TYPING: &str = "chat:typing";
}

/// A single socket frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl Frame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            ack: None,
        }
    }

    pub fn with_ack(event: &str, data: Value, ack: u64) -> Self {
        Self {
            event: event.to_string(),
            data,
            ack: Some(ack),
        }
    }
}

/// Topics a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Transport connected (first time or again)
    Connect,
    /// Transport dropped
    Disconnect,
    /// Transport connected again after a drop
    Reconnect,
    /// Any new chat message for the user
    NewMessage,
    /// New message in a joined conversation room
    ConversationMessage,
    /// Presence change of another user
    UserStatus,
    /// Typing indicator
    UserTyping,
    /// Two users with shared attributes are near each other
    ProximityMatch,
    /// Incoming connection request
    ConnectionRequest,
    /// A sent connection request was accepted
    ConnectionAccepted,
    /// A campus event was created
    EventCreated,
    /// A campus event was updated
    EventUpdated,
}

impl Topic {
    /// Name used on the wire (lifecycle topics never travel over it)
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Connect => "connect",
            Topic::Disconnect => "disconnect",
            Topic::Reconnect => "reconnect",
            Topic::NewMessage => "chat:new-message",
            Topic::ConversationMessage => "chat:conversation-message",
            Topic::UserStatus => "user:status",
            Topic::UserTyping => "chat:user-typing",
            Topic::ProximityMatch => "proximity:nearby-match",
            Topic::ConnectionRequest => "connection:request",
            Topic::ConnectionAccepted => "connection:accepted",
            Topic::EventCreated => "event:created",
            Topic::EventUpdated => "event:updated",
        }
    }

    /// Map a server event name to its topic
    ///
    /// Lifecycle names are reserved for the local transport and are not
    /// accepted from the server.
    pub fn from_server_event(name: &str) -> Option<Topic> {
        match name {
            "chat:new-message" => Some(Topic::NewMessage),
            "chat:conversation-message" => Some(Topic::ConversationMessage),
            "user:status" => Some(Topic::UserStatus),
            "chat:user-typing" => Some(Topic::UserTyping),
            "proximity:nearby-match" => Some(Topic::ProximityMatch),
            "connection:request" => Some(Topic::ConnectionRequest),
            "connection:accepted" => Some(Topic::ConnectionAccepted),
            "event:created" => Some(Topic::EventCreated),
            "event:updated" => Some(Topic::EventUpdated),
            _ => None,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Topic::Connect | Topic::Disconnect | Topic::Reconnect)
    }
}

/// An event delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub topic: Topic,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(topic: Topic, data: Value) -> Self {
        Self { topic, data }
    }

    /// Lifecycle event with no payload
    pub fn lifecycle(topic: Topic) -> Self {
        Self {
            topic,
            data: Value::Null,
        }
    }

    /// Decode the payload, `None` if it has a different shape
    pub fn payload<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

// ============ Payloads ============

/// Identity announced with `user:register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    pub user_id: String,
    pub username: String,
}

/// Body of `chat:send-message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub content: String,
}

/// Body of `chat:typing` and `chat:user-typing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Body of `user:status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub status: String,
}

/// Body of `proximity:nearby-match`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityMatch {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub profiles: HashMap<String, ProximityProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityProfile {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Result of joining a conversation room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomAck {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: &str) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }
}
