//! Socket Transports
//!
//! A [`Connector`] opens a connection and hands back a [`Link`]: a pair of
//! text-frame channels. The link's inbound channel closing means the
//! transport dropped. [`WsConnector`] speaks WebSocket; [`MemoryConnector`]
//! keeps both ends in process.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;

use super::messages::{Frame, RoomAck, ACK_EVENT};
use super::RealtimeError;

/// An open connection
pub struct Link {
    /// Frames to the server
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames from the server; closes when the transport drops
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens socket connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`, presenting `token` as a bearer credential
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<Link, RealtimeError>;
}

/// WebSocket connector
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<Link, RealtimeError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RealtimeError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        // Writer: ends when every outbound sender is gone
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: ends on close, error, or when nobody listens anymore
        tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Server side of an in-process connection
pub struct ServerEnd {
    /// Token presented by the client
    pub token: Option<String>,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl ServerEnd {
    /// Next frame sent by the client; `None` once the client hung up
    pub async fn next_frame(&mut self) -> Option<Frame> {
        while let Some(text) = self.incoming.recv().await {
            match serde_json::from_str(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => tracing::warn!(error = %e, "Dropping malformed client frame"),
            }
        }
        None
    }

    /// Frame already sent by the client, if any
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        let text = self.incoming.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Push a server event to the client
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.send_frame(&Frame::new(event, data))
    }

    /// Answer an acknowledgement request
    pub fn ack(&self, id: u64, ack: &RoomAck) -> bool {
        let data = serde_json::to_value(ack).unwrap_or(Value::Null);
        self.send_frame(&Frame::with_ack(ACK_EVENT, data, id))
    }

    /// Send a raw text frame
    pub fn send_raw(&self, text: &str) -> bool {
        self.outgoing.send(text.to_string()).is_ok()
    }

    fn send_frame(&self, frame: &Frame) -> bool {
        match serde_json::to_string(frame) {
            Ok(text) => self.outgoing.send(text).is_ok(),
            Err(_) => false,
        }
    }
}

/// In-process connector
///
/// Every successful connect delivers a [`ServerEnd`] on the channel
/// returned by [`MemoryConnector::new`]. Dropping that end simulates a
/// transport drop.
#[derive(Clone)]
pub struct MemoryConnector {
    ends: mpsc::UnboundedSender<ServerEnd>,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            ends: tx,
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        };
        (connector, rx)
    }

    /// Number of connection attempts made so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make subsequent connection attempts fail
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &str, token: Option<&str>) -> Result<Link, RealtimeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Connect("connection refused".to_string()));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let end = ServerEnd {
            token: token.map(str::to_string),
            incoming: server_rx,
            outgoing: server_tx,
        };
        self.ends
            .send(end)
            .map_err(|_| RealtimeError::Connect("no server listening".to_string()))?;

        Ok(Link {
            outbound: client_tx,
            inbound: client_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_connector_round_trip() {
        let (connector, mut ends) = MemoryConnector::new();
        let mut link = connector.connect("mem://", Some("tok")).await.unwrap();
        let mut server = ends.recv().await.unwrap();

        assert_eq!(server.token.as_deref(), Some("tok"));
        assert_eq!(connector.connect_count(), 1);

        link.outbound
            .send(serde_json::to_string(&Frame::new("chat:typing", json!({}))).unwrap())
            .unwrap();
        let frame = server.next_frame().await.unwrap();
        assert_eq!(frame.event, "chat:typing");

        server.emit("user:status", json!({"userId": "u2", "status": "online"}));
        let text = link.inbound.recv().await.unwrap();
        assert!(text.contains("user:status"));

        drop(server);
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_memory_connector_refuse() {
        let (connector, _ends) = MemoryConnector::new();
        connector.set_refuse(true);
        let result = connector.connect("mem://", None).await;
        assert!(matches!(result, Err(RealtimeError::Connect(_))));
        assert_eq!(connector.connect_count(), 1);
    }
}
