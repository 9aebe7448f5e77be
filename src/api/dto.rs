//! Data Transfer Objects
//!
//! Request and response shapes exchanged with the backend. Field names
//! follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============ Auth ============

/// Signed-in user as returned by the auth endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl User {
    /// Name shown to other users (email, then display name, then "User")
    pub fn username(&self) -> String {
        self.email
            .clone()
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| "User".to_string())
    }

    /// Role, defaulting to a regular user
    pub fn role_or_default(&self) -> &str {
        self.role.as_deref().unwrap_or("user")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
}

/// Body of login/register responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Body of `GET /api/auth/me`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<User>,
}

// ============ Users ============

/// Own profile; unknown fields are kept in `extra`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub location_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET /api/users/me`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// Payload of a location update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
}

/// Pagination for list endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }
}

// ============ Chat ============

/// A chat thread between users or bound to a community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub community_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessageResponse {
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

// ============ Safety ============

/// Request body for the content safety check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyCheckRequest {
    pub content: String,
    pub content_type: String,
}

/// Verdict of the content safety check
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyVerdict {
    #[serde(default = "default_safe")]
    pub safe: bool,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

fn default_safe() -> bool {
    true
}

// ============ Help ============

/// A previous turn in an AI help conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpTurn {
    pub role: String,
    pub content: String,
}
