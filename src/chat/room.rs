//! An open conversation
//!
//! Loads recent history, joins the conversation's socket room and keeps
//! it joined across reconnects, and collects live messages for this
//! conversation. Messages are sent over REST after a content safety check.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::state::{MessageList, LOAD_LIMIT};
use crate::api::dto::{ChatMessage, MessagesResponse, SafetyVerdict, SentMessageResponse};
use crate::api::{ApiClient, ApiFailure};
use crate::realtime::{RealtimeClient, Subscription, Topic};

/// Action shown when the safety check blocks a message without saying why
const DEFAULT_SAFETY_ACTION: &str = "block";

/// Why a message was not sent
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyNotice {
    pub action: String,
    pub flags: Vec<String>,
}

impl SafetyNotice {
    fn from_verdict(verdict: SafetyVerdict) -> Self {
        Self {
            action: verdict
                .recommended_action
                .unwrap_or_else(|| DEFAULT_SAFETY_ACTION.to_string()),
            flags: verdict.flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Stored by the backend; the echoed message if the response had one
    Sent(Option<ChatMessage>),
    /// Held back by the safety check
    Blocked(SafetyNotice),
    /// Nothing to send after trimming
    Empty,
}

pub struct ChatRoom {
    api: ApiClient,
    socket: Arc<RealtimeClient>,
    conversation_id: String,
    messages: Arc<Mutex<MessageList>>,
    subscription_ids: Vec<String>,
    task: Option<JoinHandle<()>>,
}

impl ChatRoom {
    /// Open a conversation on an initialized socket
    pub async fn open(api: ApiClient, socket: Arc<RealtimeClient>, conversation_id: &str) -> Self {
        let history = match api.chat().messages(conversation_id, Some(LOAD_LIMIT), None).await {
            Ok(success) => success
                .parse::<MessagesResponse>()
                .map(|body| body.messages)
                .unwrap_or_default(),
            Err(f) => {
                tracing::warn!(conversation_id, status = f.status, "Failed to load messages");
                Vec::new()
            }
        };
        let messages = Arc::new(Mutex::new(MessageList::from_messages(history)));

        if let Err(f) = api.chat().mark_read(conversation_id).await {
            tracing::debug!(conversation_id, status = f.status, "Mark read failed");
        }

        let connect = socket.on(Topic::Connect);
        let reconnect = socket.on(Topic::Reconnect);
        let incoming = socket.on(Topic::ConversationMessage);
        let subscription_ids = vec![
            connect.id().to_string(),
            reconnect.id().to_string(),
            incoming.id().to_string(),
        ];

        if socket.is_connected() {
            rejoin(&socket, conversation_id);
        }

        let task = tokio::spawn(follow(
            Arc::clone(&socket),
            conversation_id.to_string(),
            Arc::clone(&messages),
            connect,
            reconnect,
            incoming,
        ));

        Self {
            api,
            socket,
            conversation_id: conversation_id.to_string(),
            messages,
            subscription_ids,
            task: Some(task),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Snapshot of the messages received so far
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.messages).as_slice().to_vec()
    }

    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.messages).is_empty()
    }

    /// Send a message after the content safety check
    ///
    /// An unavailable safety service does not block sending.
    pub async fn send(&self, content: &str) -> Result<SendOutcome, ApiFailure> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(SendOutcome::Empty);
        }

        match self.api.safety().check(content, "message").await {
            Ok(success) => {
                if let Ok(verdict) = success.parse::<SafetyVerdict>() {
                    if !verdict.safe {
                        let notice = SafetyNotice::from_verdict(verdict);
                        tracing::info!(conversation_id = %self.conversation_id, action = %notice.action, "Message blocked by safety check");
                        return Ok(SendOutcome::Blocked(notice));
                    }
                }
            }
            Err(f) => tracing::debug!(status = f.status, "Safety check unavailable, sending anyway"),
        }

        let success = self.api.chat().send_message(&self.conversation_id, content).await?;
        let sent = success
            .parse::<SentMessageResponse>()
            .ok()
            .and_then(|body| body.message);

        if let Some(message) = &sent {
            lock(&self.messages).push(message.clone());
        }
        Ok(SendOutcome::Sent(sent))
    }

    /// Leave the room and stop listening
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        for id in &self.subscription_ids {
            self.socket.off(id);
        }
        self.socket.leave_conversation(&self.conversation_id);
        tracing::debug!(conversation_id = %self.conversation_id, "Left conversation");
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(messages: &Mutex<MessageList>) -> MutexGuard<'_, MessageList> {
    messages.lock().unwrap_or_else(|e| e.into_inner())
}

/// Register again and join the room; a refused join is only logged
fn rejoin(socket: &Arc<RealtimeClient>, conversation_id: &str) {
    socket.register_user(socket.user());
    let pending = socket.join_conversation(conversation_id);
    let conversation_id = conversation_id.to_string();
    tokio::spawn(async move {
        let ack = pending.await;
        if !ack.ok {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = ack.error.as_deref().unwrap_or("unknown"),
                "Failed to join conversation room"
            );
        }
    });
}

async fn follow(
    socket: Arc<RealtimeClient>,
    conversation_id: String,
    messages: Arc<Mutex<MessageList>>,
    mut connect: Subscription,
    mut reconnect: Subscription,
    mut incoming: Subscription,
) {
    loop {
        tokio::select! {
            event = connect.recv() => match event {
                Some(_) => rejoin(&socket, &conversation_id),
                None => break,
            },
            event = reconnect.recv() => match event {
                Some(_) => rejoin(&socket, &conversation_id),
                None => break,
            },
            event = incoming.recv() => match event {
                Some(event) => {
                    let Some(message) = event.payload::<ChatMessage>() else {
                        tracing::warn!("Ignoring malformed conversation message");
                        continue;
                    };
                    if message.conversation_id == conversation_id {
                        lock(&messages).push(message);
                    }
                }
                None => break,
            },
        }
    }
}
