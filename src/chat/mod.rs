//! Chat Module
//!
//! Conversation list with unread counts, per-conversation message lists,
//! [`ConversationFeed`] to keep the list live, and [`ChatRoom`] for an
//! open conversation.

mod feed;
mod room;
mod state;

pub use feed::ConversationFeed;
pub use room::{ChatRoom, SafetyNotice, SendOutcome};
pub use state::{ConversationList, MessageList, LOAD_LIMIT};
