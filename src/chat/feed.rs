//! Live conversation list
//!
//! Keeps a [`ConversationList`] current from socket message events. A
//! message for a known conversation updates its preview and unread count
//! in place; a message for a conversation the list has not seen triggers a
//! reload from the backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::state::ConversationList;
use crate::api::dto::{ChatMessage, Conversation};
use crate::api::ApiClient;
use crate::realtime::{RealtimeClient, Subscription, Topic};

/// Recent message ids remembered to skip the same message on both topics
const SEEN_CAPACITY: usize = 256;

pub struct ConversationFeed {
    api: ApiClient,
    socket: Arc<RealtimeClient>,
    list: Arc<Mutex<ConversationList>>,
    version: watch::Receiver<u64>,
    subscription_ids: Vec<String>,
    task: Option<JoinHandle<()>>,
}

impl ConversationFeed {
    /// Start following message events, seeded with `list`
    pub fn start(api: ApiClient, socket: Arc<RealtimeClient>, list: ConversationList) -> Self {
        let list = Arc::new(Mutex::new(list));
        let (version_tx, version) = watch::channel(0u64);

        let direct = socket.on(Topic::NewMessage);
        let scoped = socket.on(Topic::ConversationMessage);
        let subscription_ids = vec![direct.id().to_string(), scoped.id().to_string()];

        let task = tokio::spawn(follow(
            api.clone(),
            socket.user().user_id.clone(),
            Arc::clone(&list),
            version_tx,
            direct,
            scoped,
        ));

        Self {
            api,
            socket,
            list,
            version,
            subscription_ids,
            task: Some(task),
        }
    }

    /// Snapshot of the conversations, most recent first
    pub fn conversations(&self) -> Vec<Conversation> {
        lock(&self.list).conversations().to_vec()
    }

    pub fn total_unread_chats(&self) -> usize {
        lock(&self.list).total_unread_chats()
    }

    /// Receiver bumped after every change to the list
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.clone()
    }

    /// Tell the backend a conversation was read, then zero it locally
    pub async fn mark_as_read(&self, id: &str) {
        match self.api.chat().mark_read(id).await {
            Ok(_) => {
                lock(&self.list).mark_read(id);
            }
            Err(f) => tracing::debug!(conversation_id = id, status = f.status, "Mark read failed"),
        }
    }

    /// Stop following and hand back the list
    pub fn stop(mut self) -> ConversationList {
        self.shutdown();
        lock(&self.list).clone()
    }

    fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        for id in &self.subscription_ids {
            self.socket.off(id);
        }
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(list: &Mutex<ConversationList>) -> MutexGuard<'_, ConversationList> {
    list.lock().unwrap_or_else(|e| e.into_inner())
}

async fn follow(
    api: ApiClient,
    own_user_id: String,
    list: Arc<Mutex<ConversationList>>,
    version: watch::Sender<u64>,
    mut direct: Subscription,
    mut scoped: Subscription,
) {
    let mut seen: VecDeque<String> = VecDeque::with_capacity(SEEN_CAPACITY);

    loop {
        let event = tokio::select! {
            event = direct.recv() => event,
            event = scoped.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let Some(message) = event.payload::<ChatMessage>() else {
            tracing::warn!(topic = event.topic.as_str(), "Ignoring malformed chat message");
            continue;
        };

        if seen.contains(&message.id) {
            continue;
        }
        if seen.len() == SEEN_CAPACITY {
            seen.pop_front();
        }
        seen.push_back(message.id.clone());

        let known = lock(&list).apply_message(&message, &own_user_id);
        if !known {
            let mut fresh = ConversationList::new();
            match fresh.load(&api).await {
                Ok(_) => *lock(&list) = fresh,
                Err(f) => {
                    tracing::warn!(
                        conversation_id = %message.conversation_id,
                        status = f.status,
                        "Failed to reload conversations"
                    );
                    continue;
                }
            }
        }
        version.send_modify(|v| *v += 1);
    }
}
