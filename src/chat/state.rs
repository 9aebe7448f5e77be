//! Chat state containers

use std::collections::HashSet;

use crate::api::dto::{ChatMessage, Conversation, ConversationsResponse, Page};
use crate::api::{ApiClient, ApiFailure};

/// Number of conversations and messages fetched per load
pub const LOAD_LIMIT: u32 = 50;

/// Ordered messages of one conversation, unique by id
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a loaded page, dropping repeated ids
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let mut list = Self::new();
        for message in messages {
            list.push(message);
        }
        list
    }

    /// Append a message; `false` if its id is already present
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}

/// Conversations of the signed-in user, most recent first
#[derive(Debug, Clone, Default)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Merge into an existing conversation or put a new one on top
    pub fn upsert(&mut self, conversation: Conversation) {
        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => merge(existing, conversation),
            None => self.conversations.insert(0, conversation),
        }
    }

    /// Fold a live message into its conversation and move it to the top
    ///
    /// Messages from `own_user_id` update the preview without counting as
    /// unread. Returns `false` when the conversation is not in the list.
    pub fn apply_message(&mut self, message: &ChatMessage, own_user_id: &str) -> bool {
        let Some(index) = self
            .conversations
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            return false;
        };

        let mut conversation = self.conversations.remove(index);
        conversation.last_message = Some(message.content.clone());
        if message.created_at.is_some() {
            conversation.last_message_at = message.created_at.clone();
        }
        if message.sender_id.as_deref() != Some(own_user_id) {
            conversation.unread_count += 1;
        }
        self.conversations.insert(0, conversation);
        true
    }

    /// Zero the unread count locally
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Number of conversations with unread messages
    pub fn total_unread_chats(&self) -> usize {
        self.conversations.iter().filter(|c| c.unread_count > 0).count()
    }

    /// Fetch the latest conversations and replace the list
    pub async fn load(&mut self, api: &ApiClient) -> Result<usize, ApiFailure> {
        let success = api.chat().conversations(Page::limit(LOAD_LIMIT)).await?;
        let body: ConversationsResponse = success.parse()?;
        let count = body.conversations.len();
        self.replace_all(body.conversations);
        tracing::debug!(count, "Loaded conversations");
        Ok(count)
    }

    /// Tell the backend a conversation was read, then update locally
    ///
    /// A failed request is ignored; the next load corrects the count.
    pub async fn mark_as_read(&mut self, api: &ApiClient, id: &str) {
        match api.chat().mark_read(id).await {
            Ok(_) => {
                self.mark_read(id);
            }
            Err(f) => tracing::debug!(conversation_id = id, status = f.status, "Mark read failed"),
        }
    }
}

fn merge(existing: &mut Conversation, update: Conversation) {
    if update.kind.is_some() {
        existing.kind = update.kind;
    }
    if update.name.is_some() {
        existing.name = update.name;
    }
    if !update.participants.is_empty() {
        existing.participants = update.participants;
    }
    if update.community_id.is_some() {
        existing.community_id = update.community_id;
    }
    if update.last_message.is_some() {
        existing.last_message = update.last_message;
    }
    if update.last_message_at.is_some() {
        existing.last_message_at = update.last_message_at;
    }
    existing.unread_count = update.unread_count;
}
