//! Real-time Client
//!
//! One socket connection per session. A background driver task connects,
//! registers the user after every transport connect, dispatches incoming
//! frames to the [`EventBus`], and reconnects with a fixed delay for a
//! bounded number of attempts.
//!
//! Emits while not connected are dropped; there is no outbox. Rooms are
//! not re-joined automatically, listeners react to [`Topic::Reconnect`].

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::bus::{EventBus, Subscription};
use super::messages::{
    client_events, Frame, OutgoingMessage, RoomAck, ServerEvent, Topic, TypingIndicator,
    UserRegistration, ACK_EVENT,
};
use super::transport::{Connector, Link};
use crate::api::dto::LocationUpdate;
use crate::session::SessionStore;

/// Lifecycle of the socket handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle exists
    Uninitialized,
    /// Connection attempt in flight
    Connecting,
    /// Transport is up
    Connected,
    /// Transport dropped; reconnecting or given up
    Disconnected,
    /// Closed by [`RealtimeClient::disconnect`]
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Configuration for the real-time client
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Socket URL (e.g., "ws://localhost:5001/ws")
    pub url: String,
    /// Reconnect after a drop or a failed attempt
    pub reconnection: bool,
    /// Consecutive failed attempts before giving up
    pub reconnection_attempts: u32,
    /// Fixed delay between attempts
    pub reconnection_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5001/ws".to_string(),
            reconnection: true,
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_millis(1000),
        }
    }
}

/// Acknowledgement of a room join that may never arrive
///
/// There is no client-side timeout: without an answer from the server
/// this future stays pending until the handle is disconnected.
pub struct PendingAck {
    receiver: oneshot::Receiver<RoomAck>,
}

impl Future for PendingAck {
    type Output = RoomAck;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| RoomAck::failed("connection closed")))
    }
}

struct Inner {
    config: RealtimeConfig,
    user: UserRegistration,
    store: Option<Arc<dyn SessionStore>>,
    bus: EventBus,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending_acks: Mutex<HashMap<u64, oneshot::Sender<RoomAck>>>,
    next_ack: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit_frame(&self, frame: &Frame) -> bool {
        if *self.state.borrow() != ConnectionState::Connected {
            tracing::debug!(event = %frame.event, "Socket not connected, dropping emit");
            return false;
        }

        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(event = %frame.event, error = %e, "Failed to encode frame");
                return false;
            }
        };

        match lock(&self.link).as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => {
                tracing::debug!(event = %frame.event, "Socket not connected, dropping emit");
                false
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed socket frame");
                return;
            }
        };

        if frame.event == ACK_EVENT {
            let Some(id) = frame.ack else {
                tracing::warn!("Acknowledgement without id");
                return;
            };
            let waiter = lock(&self.pending_acks).remove(&id);
            match waiter {
                Some(tx) => {
                    let ack = serde_json::from_value(frame.data)
                        .unwrap_or_else(|_| RoomAck::failed("malformed acknowledgement"));
                    let _ = tx.send(ack);
                }
                None => tracing::debug!(ack_id = id, "Acknowledgement for unknown request"),
            }
            return;
        }

        match Topic::from_server_event(&frame.event) {
            Some(topic) => {
                self.bus.publish(ServerEvent::new(topic, frame.data));
            }
            None => tracing::trace!(event = %frame.event, "Unhandled socket event"),
        }
    }

    fn fail_pending_acks(&self) {
        let pending: Vec<_> = lock(&self.pending_acks).drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(RoomAck::failed("connection closed"));
        }
    }
}

/// Handle to the session's socket connection
pub struct RealtimeClient {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Create the handle and start connecting in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: RealtimeConfig,
        user: UserRegistration,
        store: Option<Arc<dyn SessionStore>>,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            config,
            user,
            store,
            bus: EventBus::new(),
            state,
            link: Mutex::new(None),
            pending_acks: Mutex::new(HashMap::new()),
            next_ack: AtomicU64::new(1),
        });

        let driver = tokio::spawn(run(Arc::clone(&inner), connector, shutdown_rx));

        Arc::new(Self {
            inner,
            shutdown,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Identity registered on every connect
    pub fn user(&self) -> &UserRegistration {
        &self.inner.user
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the handle reaches `target`
    ///
    /// Returns `false` if the handle went away first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut rx = self.watch_state();
        loop {
            if *rx.borrow_and_update() == target {
                return true;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Listen to a topic
    pub fn on(&self, topic: Topic) -> Subscription {
        self.inner.bus.subscribe(topic)
    }

    /// Stop listening; other listeners of the topic are unaffected
    pub fn off(&self, subscription_id: &str) -> bool {
        self.inner.bus.unsubscribe(subscription_id)
    }

    /// Announce a user identity
    pub fn register_user(&self, user: &UserRegistration) -> bool {
        self.emit(client_events::USER_REGISTER, user)
    }

    /// Send a chat message over the socket
    pub fn send_message(&self, message: &OutgoingMessage) -> bool {
        self.emit(client_events::SEND_MESSAGE, message)
    }

    pub fn emit_typing(&self, typing: &TypingIndicator) -> bool {
        self.emit(client_events::TYPING, typing)
    }

    pub fn update_location(&self, update: LocationUpdate) -> bool {
        self.emit(client_events::LOCATION_UPDATE, &update)
    }

    /// Join a conversation room
    ///
    /// The returned future resolves with the server's acknowledgement. A
    /// join attempted while disconnected is dropped like any other emit,
    /// so its acknowledgement never arrives.
    pub fn join_conversation(&self, conversation_id: &str) -> PendingAck {
        let id = self.inner.next_ack.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.inner.pending_acks);
            // Waiters whose PendingAck was dropped can never be observed
            pending.retain(|_, waiter| !waiter.is_closed());
            pending.insert(id, tx);
        }

        let data = serde_json::json!({ "conversationId": conversation_id });
        let sent = self
            .inner
            .emit_frame(&Frame::with_ack(client_events::JOIN_CONVERSATION, data, id));
        tracing::debug!(conversation_id, ack_id = id, sent, "Joining conversation");

        PendingAck { receiver: rx }
    }

    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        self.emit(
            client_events::LEAVE_CONVERSATION,
            &serde_json::json!({ "conversationId": conversation_id }),
        )
    }

    /// Emit an arbitrary event; `false` if it was dropped
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> bool {
        let data = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(event, error = %e, "Failed to encode event payload");
                return false;
            }
        };
        self.inner.emit_frame(&Frame::new(event, data))
    }

    /// Tear down the connection for good
    ///
    /// Pending acknowledgements resolve as failed and every listener's
    /// channel ends.
    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        lock(&self.inner.link).take();
        self.inner.set_state(ConnectionState::Closed);
        self.inner.fail_pending_acks();
        self.inner.bus.clear();
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
    }

    /// Number of listeners on a topic
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.inner.bus.subscriber_count(topic)
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
    }
}

/// Connection driver
async fn run(inner: Arc<Inner>, connector: Arc<dyn Connector>, mut shutdown: watch::Receiver<bool>) {
    let mut connected_before = false;
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        inner.set_state(ConnectionState::Connecting);

        let token = inner.store.as_ref().and_then(|s| s.get());
        let attempt = tokio::select! {
            result = connector.connect(&inner.config.url, token.as_deref()) => result,
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok(link) => {
                failures = 0;
                let closed = serve(&inner, link, connected_before, &mut shutdown).await;
                connected_before = true;
                if closed {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(url = %inner.config.url, attempt = failures, error = %e, "Socket connection error");
                inner.set_state(ConnectionState::Disconnected);
            }
        }

        if !inner.config.reconnection || failures >= inner.config.reconnection_attempts {
            tracing::warn!(attempts = failures, "Socket reconnection stopped");
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.config.reconnection_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    inner.set_state(ConnectionState::Closed);
}

/// Pump one live connection; returns `true` when closed on request
async fn serve(
    inner: &Inner,
    mut link: Link,
    reconnect: bool,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    *lock(&inner.link) = Some(link.outbound.clone());
    inner.set_state(ConnectionState::Connected);
    tracing::info!(url = %inner.config.url, reconnect, "Socket connected");

    inner.bus.publish(ServerEvent::lifecycle(Topic::Connect));
    if reconnect {
        inner.bus.publish(ServerEvent::lifecycle(Topic::Reconnect));
    }

    let registration = serde_json::to_value(&inner.user).unwrap_or(Value::Null);
    inner.emit_frame(&Frame::new(client_events::USER_REGISTER, registration));

    let closed = loop {
        tokio::select! {
            frame = link.inbound.recv() => match frame {
                Some(text) => inner.dispatch(&text),
                None => break false,
            },
            _ = shutdown.changed() => break true,
        }
    };

    lock(&inner.link).take();

    if !closed {
        inner.set_state(ConnectionState::Disconnected);
        tracing::warn!(url = %inner.config.url, "Socket disconnected");
        inner.bus.publish(ServerEvent::lifecycle(Topic::Disconnect));
    }

    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::transport::MemoryConnector;
    use serde_json::json;
    use tokio::time::timeout;

    fn user() -> UserRegistration {
        UserRegistration {
            user_id: "u1".to_string(),
            username: "ada@campus.edu".to_string(),
        }
    }

    fn fast_config() -> RealtimeConfig {
        RealtimeConfig {
            url: "mem://test".to_string(),
            reconnection: true,
            reconnection_attempts: 3,
            reconnection_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_registers_user_after_connect() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector));

        let mut server = ends.recv().await.unwrap();
        assert!(client.wait_for_state(ConnectionState::Connected).await);

        let frame = server.next_frame().await.unwrap();
        assert_eq!(frame.event, client_events::USER_REGISTER);
        assert_eq!(frame.data, json!({"userId": "u1", "username": "ada@campus.edu"}));

        client.disconnect();
    }

    #[tokio::test]
    async fn test_token_presented_at_connect() {
        let (connector, mut ends) = MemoryConnector::new();
        let store: Arc<dyn SessionStore> =
            Arc::new(crate::session::MemorySessionStore::with_token("secret"));
        let client = RealtimeClient::start(fast_config(), user(), Some(store), Arc::new(connector));

        let server = ends.recv().await.unwrap();
        assert_eq!(server.token.as_deref(), Some("secret"));
        client.disconnect();
    }

    #[tokio::test]
    async fn test_incoming_events_fan_out() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector));
        let mut a = client.on(Topic::NewMessage);
        let mut b = client.on(Topic::NewMessage);

        let server = ends.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Connected).await;

        server.emit("chat:new-message", json!({"id": "m1"}));
        assert_eq!(a.recv().await.unwrap().data["id"], "m1");
        assert_eq!(b.recv().await.unwrap().data["id"], "m1");

        client.off(a.id());
        server.emit("chat:new-message", json!({"id": "m2"}));
        assert_eq!(b.recv().await.unwrap().data["id"], "m2");
        assert_eq!(client.listener_count(Topic::NewMessage), 1);

        client.disconnect();
    }

    #[tokio::test]
    async fn test_join_ack_ok_and_error() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector));
        let mut server = ends.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Connected).await;
        server.next_frame().await.unwrap(); // registration

        let pending = client.join_conversation("c1");
        let frame = server.next_frame().await.unwrap();
        assert_eq!(frame.event, client_events::JOIN_CONVERSATION);
        assert_eq!(frame.data["conversationId"], "c1");
        server.ack(frame.ack.unwrap(), &RoomAck::ok());
        assert_eq!(pending.await, RoomAck::ok());

        let pending = client.join_conversation("c2");
        let frame = server.next_frame().await.unwrap();
        server.ack(frame.ack.unwrap(), &RoomAck::failed("not a participant"));
        let ack = pending.await;
        assert!(!ack.ok);
        assert_eq!(ack.error.as_deref(), Some("not a participant"));

        client.disconnect();
    }

    #[tokio::test]
    async fn test_join_without_ack_stays_pending() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector));
        let _server = ends.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Connected).await;

        let mut pending = client.join_conversation("c1");
        let waited = timeout(Duration::from_millis(100), &mut pending).await;
        assert!(waited.is_err(), "join resolved without an acknowledgement");

        // Only a manual disconnect releases the waiter
        client.disconnect();
        let ack = pending.await;
        assert_eq!(ack, RoomAck::failed("connection closed"));
    }

    #[tokio::test]
    async fn test_abandoned_joins_are_pruned() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector));
        let _server = ends.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Connected).await;

        for i in 0..10 {
            drop(client.join_conversation(&format!("c{}", i)));
        }
        let kept = client.join_conversation("last");
        assert_eq!(lock(&client.inner.pending_acks).len(), 1);

        client.disconnect();
        assert_eq!(kept.await, RoomAck::failed("connection closed"));
    }

    #[tokio::test]
    async fn test_emits_dropped_while_disconnected() {
        let (connector, mut ends) = MemoryConnector::new();
        connector.set_refuse(true);
        let config = RealtimeConfig {
            reconnection: false,
            ..fast_config()
        };
        let client = RealtimeClient::start(config, user(), None, Arc::new(connector.clone()));

        assert!(client.wait_for_state(ConnectionState::Disconnected).await);
        let sent = client.send_message(&OutgoingMessage {
            conversation_id: "c1".to_string(),
            content: "hello".to_string(),
        });
        assert!(!sent);
        assert!(!client.update_location(LocationUpdate { lat: 1.0, lng: 2.0 }));
        assert!(ends.try_recv().is_err());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_publishes_events_and_reregisters() {
        let (connector, mut ends) = MemoryConnector::new();
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector.clone()));
        let mut disconnects = client.on(Topic::Disconnect);
        let mut reconnects = client.on(Topic::Reconnect);

        let first = ends.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Connected).await;

        // Transport drop
        drop(first);
        assert_eq!(disconnects.recv().await.unwrap().topic, Topic::Disconnect);

        let mut second = ends.recv().await.unwrap();
        assert_eq!(reconnects.recv().await.unwrap().topic, Topic::Reconnect);
        let frame = second.next_frame().await.unwrap();
        assert_eq!(frame.event, client_events::USER_REGISTER);
        assert_eq!(connector.connect_count(), 2);

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let (connector, _ends) = MemoryConnector::new();
        connector.set_refuse(true);
        let client = RealtimeClient::start(fast_config(), user(), None, Arc::new(connector.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connector.connect_count(), 3);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
