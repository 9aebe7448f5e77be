//! Connection Manager
//!
//! Owns the single [`RealtimeClient`] of the session. The handle is only
//! reachable through here; `disconnect` clears the slot so the next
//! `initialize` builds a fresh connection.

use std::sync::{Arc, Mutex, MutexGuard};

use super::client::{ConnectionState, RealtimeClient, RealtimeConfig};
use super::messages::UserRegistration;
use super::transport::{Connector, WsConnector};
use crate::session::SessionStore;

pub struct ConnectionManager {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    store: Arc<dyn SessionStore>,
    slot: Mutex<Option<Arc<RealtimeClient>>>,
}

impl ConnectionManager {
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            connector,
            store,
            slot: Mutex::new(None),
        }
    }

    /// Manager backed by the WebSocket transport
    pub fn with_websocket(config: RealtimeConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::new(config, Arc::new(WsConnector), store)
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<RealtimeClient>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the connection, or return the existing one unchanged
    ///
    /// The token is read from the session store at every connect attempt.
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self, user: UserRegistration) -> Arc<RealtimeClient> {
        let mut slot = self.slot();

        if let Some(existing) = slot.as_ref() {
            tracing::debug!(user_id = %existing.user().user_id, "Socket already initialized");
            return Arc::clone(existing);
        }

        tracing::info!(url = %self.config.url, user_id = %user.user_id, "Initializing socket");
        let client = RealtimeClient::start(
            self.config.clone(),
            user,
            Some(Arc::clone(&self.store)),
            Arc::clone(&self.connector),
        );
        *slot = Some(Arc::clone(&client));
        client
    }

    /// Current handle, if initialized
    pub fn socket(&self) -> Option<Arc<RealtimeClient>> {
        self.slot().clone()
    }

    /// Close the connection and forget the handle
    pub fn disconnect(&self) {
        let client = self.slot().take();
        if let Some(client) = client {
            client.disconnect();
            tracing::info!("Socket disconnected");
        }
    }

    pub fn status(&self) -> ConnectionState {
        self.slot()
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ConnectionState::Uninitialized)
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(client) = self.slot().take() {
            client.disconnect();
        }
    }
}
