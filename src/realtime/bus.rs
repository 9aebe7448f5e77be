//! Event Bus
//!
//! Topic based fan-out of server events to any number of listeners. Each
//! subscription has its own id and channel, so removing one listener never
//! affects another listener of the same topic.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{ServerEvent, Topic};

/// Unique identifier for a subscription
pub type SubscriptionId = String;

/// A listener registered on one topic
///
/// Dropping the subscription detaches it; the bus prunes it on the next
/// publish to its topic.
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event; `None` once the bus has dropped this listener
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Topic -> subscribers map
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, HashMap<SubscriptionId, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on a topic
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();

        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic)
            .or_default()
            .insert(id.clone(), tx);

        tracing::debug!(topic = topic.as_str(), subscription_id = %id, "Subscribed");

        Subscription {
            id,
            topic,
            receiver: rx,
        }
    }

    /// Remove one listener; returns whether it was registered
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());

        let mut removed = false;
        subs.retain(|_, listeners| {
            if listeners.remove(id).is_some() {
                removed = true;
            }
            !listeners.is_empty()
        });

        if removed {
            tracing::debug!(subscription_id = %id, "Unsubscribed");
        }
        removed
    }

    /// Deliver an event to every listener of its topic
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, event: ServerEvent) -> usize {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());

        let Some(listeners) = subs.get_mut(&event.topic) else {
            return 0;
        };

        let mut sent_count = 0;
        listeners.retain(|_, sender| match sender.send(event.clone()) {
            Ok(()) => {
                sent_count += 1;
                true
            }
            Err(_) => false,
        });

        if listeners.is_empty() {
            subs.remove(&event.topic);
        }

        if sent_count > 0 {
            tracing::trace!(
                topic = event.topic.as_str(),
                subscribers = sent_count,
                "Published event"
            );
        }

        sent_count
    }

    /// Number of listeners on a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Drop every listener, ending their channels
    pub fn clear(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
