//! End-to-end client flows
//!
//! Runs a small in-process backend (REST + WebSocket) on a random local
//! port and drives the public client API against it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

use campusconnect::api::DEFAULT_ERROR_MESSAGE;
use campusconnect::chat::{ChatRoom, ConversationList, SendOutcome};
use campusconnect::location::{ChannelSource, LocationSample, LocationWatcher, UpdateOutcome};
use campusconnect::realtime::{ConnectionManager, ConnectionState, OutgoingMessage, RealtimeConfig, Topic, UserRegistration};
use campusconnect::{ApiClient, ApiClientConfig, AuthService, FileSessionStore, MemorySessionStore, SessionStore};

// ============ Test backend ============

#[derive(Default)]
struct Backend {
    /// email -> (password, user)
    users: HashMap<String, (String, Value)>,
    /// token -> user
    tokens: HashMap<String, Value>,
    socket_tokens: Vec<Option<String>>,
    socket_events: Vec<String>,
}

type Shared = Arc<Mutex<Backend>>;

type Reply = (StatusCode, Json<Value>);

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn register(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let mut backend = state.lock().unwrap();
    if backend.users.contains_key(&email) {
        return (StatusCode::CONFLICT, Json(json!({"error": "Email already registered"})));
    }

    let uid = format!("uid-{}", backend.users.len() + 1);
    let user = json!({"uid": uid, "email": email, "displayName": body["name"], "role": "user"});
    let password = body["password"].as_str().unwrap_or_default().to_string();
    backend.users.insert(email, (password, user.clone()));

    let token = format!("token-{}", uid);
    backend.tokens.insert(token.clone(), user.clone());
    (StatusCode::CREATED, Json(json!({"token": token, "user": user})))
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let mut backend = state.lock().unwrap();

    let Some((stored, user)) = backend.users.get(email).cloned() else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "No account found"})));
    };
    if stored != password {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid credentials"})));
    }

    let token = format!("token-{}-{}", user["uid"].as_str().unwrap_or_default(), backend.tokens.len());
    backend.tokens.insert(token.clone(), user.clone());
    (StatusCode::OK, Json(json!({"token": token, "user": user})))
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let backend = state.lock().unwrap();
    match bearer(&headers).and_then(|t| backend.tokens.get(&t).cloned()) {
        Some(user) => (StatusCode::OK, Json(json!({"success": true, "user": user}))),
        None => (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    if let Some(token) = bearer(&headers) {
        state.lock().unwrap().tokens.remove(&token);
    }
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn health() -> Reply {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn echo_auth(headers: HeaderMap) -> Reply {
    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    (StatusCode::OK, Json(json!({"authorization": auth})))
}

async fn fail_message() -> Reply {
    (StatusCode::BAD_REQUEST, Json(json!({"message": "Bad input", "error": "x"})))
}

async fn fail_error() -> Reply {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

async fn fail_empty() -> Reply {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
}

async fn update_location(Path(id): Path<String>, Json(body): Json<Value>) -> Reply {
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "db down"})));
    }
    if body["lat"].as_f64().unwrap_or_default() < 0.0 {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Location outside campus geofence"})),
        );
    }
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn conversations() -> Reply {
    (
        StatusCode::OK,
        Json(json!({"conversations": [
            {"id": "c1", "type": "direct", "unreadCount": 2},
            {"id": "c2", "type": "community", "name": "Robotics Club"}
        ]})),
    )
}

async fn list_messages(Path(id): Path<String>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({"messages": [{"id": "m0", "conversationId": id, "content": "earlier"}]})),
    )
}

async fn post_message(Path(id): Path<String>, Json(body): Json<Value>) -> Reply {
    (
        StatusCode::CREATED,
        Json(json!({"message": {"id": "m-new", "conversationId": id, "content": body["content"]}})),
    )
}

async fn mark_read() -> Reply {
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn safety_check(Json(body): Json<Value>) -> Reply {
    let content = body["content"].as_str().unwrap_or_default();
    if content.contains("badword") {
        return (
            StatusCode::OK,
            Json(json!({"safe": false, "recommendedAction": "warn", "flags": ["profanity"]})),
        );
    }
    (StatusCode::OK, Json(json!({"safe": true})))
}

async fn ws_handler(ws: WebSocketUpgrade, headers: HeaderMap, State(state): State<Shared>) -> Response {
    state.lock().unwrap().socket_tokens.push(bearer(&headers));
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Shared) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let event = frame["event"].as_str().unwrap_or_default().to_string();
        state.lock().unwrap().socket_events.push(event.clone());

        let reply = match event.as_str() {
            "chat:join-conversation" => Some(json!({"event": "ack", "ack": frame["ack"], "data": {"ok": true}})),
            "chat:send-message" => Some(json!({
                "event": "chat:conversation-message",
                "data": {
                    "id": "m-live",
                    "conversationId": frame["data"]["conversationId"],
                    "content": frame["data"]["content"]
                }
            })),
            _ => None,
        };

        if let Some(reply) = reply {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    }
}

async fn spawn_backend() -> (String, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/echo-auth", get(echo_auth))
        .route("/api/fail/message", get(fail_message))
        .route("/api/fail/error", get(fail_error))
        .route("/api/fail/empty", get(fail_empty))
        .route("/api/users/:id/location", patch(update_location))
        .route("/api/chat/conversations", get(conversations))
        .route(
            "/api/chat/conversations/:id/messages",
            get(list_messages).post(post_message),
        )
        .route("/api/chat/conversations/:id/read", post(mark_read))
        .route("/api/safety/check", post(safety_check))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn client(base_url: &str, store: Arc<dyn SessionStore>) -> ApiClient {
    ApiClient::new(
        ApiClientConfig {
            base_url: base_url.to_string(),
        },
        store,
    )
}

fn socket_config(base_url: &str) -> RealtimeConfig {
    RealtimeConfig {
        url: format!("{}/ws", base_url.replacen("http://", "ws://", 1)),
        reconnection_delay: Duration::from_millis(50),
        ..RealtimeConfig::default()
    }
}

fn ada() -> UserRegistration {
    UserRegistration {
        user_id: "uid-1".to_string(),
        username: "ada@campus.edu".to_string(),
    }
}

// ============ HTTP wrapper ============

#[tokio::test]
async fn test_results_are_normalized() {
    let (base, _) = spawn_backend().await;
    let api = client(&base, Arc::new(MemorySessionStore::new()));

    let ok = api.check_health().await.unwrap();
    assert_eq!(ok.status, 200);
    assert_eq!(ok.data["status"], "ok");

    let f = api.get("/api/fail/message").await.unwrap_err();
    assert_eq!(f.message, "Bad input");
    assert_eq!(f.status, 400);
    assert_eq!(f.details(), vec!["x"]);

    let f = api.get("/api/fail/error").await.unwrap_err();
    assert_eq!(f.message, "Not found");
    assert_eq!(f.status, 404);
    assert_eq!(f.details(), vec!["Not found"]);

    let f = api.get("/api/fail/empty").await.unwrap_err();
    assert_eq!(f.message, DEFAULT_ERROR_MESSAGE);
    assert_eq!(f.status, 500);

    let offline = client("http://127.0.0.1:9", Arc::new(MemorySessionStore::new()));
    let f = offline.check_health().await.unwrap_err();
    assert_eq!(f.status, 0);
    assert_eq!(f.message, "network error");
    assert!(f.data.is_none());
}

#[tokio::test]
async fn test_bearer_header_follows_store() {
    let (base, _) = spawn_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    let api = client(&base, store.clone());

    let echoed = api.get("/api/echo-auth").await.unwrap();
    assert!(echoed.data["authorization"].is_null());

    store.set("abc.def").unwrap();
    let echoed = api.get("/api/echo-auth").await.unwrap();
    assert_eq!(echoed.data["authorization"], "Bearer abc.def");

    store.clear().unwrap();
    let echoed = api.get("/api/echo-auth").await.unwrap();
    assert!(echoed.data["authorization"].is_null());
}

// ============ Auth ============

#[tokio::test]
async fn test_register_reload_logout() {
    let (base, _) = spawn_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let store = Arc::new(FileSessionStore::open(&path).unwrap());
        let auth = AuthService::new(client(&base, store));
        let user = auth.signup("ada@campus.edu", "pw", "Ada").await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@campus.edu"));
        assert_eq!(auth.role().await, "user");
    }

    // Fresh process: only the session file survives
    let store = Arc::new(FileSessionStore::open(&path).unwrap());
    let token = store.get().expect("token persisted");
    let api = client(&base, store.clone());
    let auth = AuthService::new(api.clone());

    let user = auth.hydrate().await.expect("session restored");
    assert_eq!(user.uid, "uid-1");
    assert_eq!(auth.current_user().await, Some(user));

    let echoed = api.get("/api/echo-auth").await.unwrap();
    assert_eq!(echoed.data["authorization"], format!("Bearer {}", token));

    auth.logout().await;
    assert!(store.get().is_none());
    assert!(auth.current_user().await.is_none());
    assert_eq!(auth.role().await, "guest");

    let echoed = api.get("/api/echo-auth").await.unwrap();
    assert!(echoed.data["authorization"].is_null());
    assert!(FileSessionStore::open(&path).unwrap().get().is_none());
}

#[tokio::test]
async fn test_login_and_register_failures() {
    let (base, _) = spawn_backend().await;
    let store = Arc::new(MemorySessionStore::new());
    let auth = AuthService::new(client(&base, store.clone()));

    auth.signup("grace@campus.edu", "right", "Grace").await.unwrap();
    auth.logout().await;

    let err = auth.login("grace@campus.edu", "wrong").await.unwrap_err();
    assert_eq!(err.code, "backend/login-failed");
    assert_eq!(err.message, "Invalid credentials");
    assert!(store.get().is_none());

    let err = auth.signup("grace@campus.edu", "x", "Grace").await.unwrap_err();
    assert_eq!(err.code, "backend/register-failed");
    assert_eq!(err.message, "Email already registered");

    let user = auth.login("grace@campus.edu", "right").await.unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Grace"));
    assert!(store.get().is_some());
}

#[tokio::test]
async fn test_rejected_token_is_cleared() {
    let (base, _) = spawn_backend().await;
    let store = Arc::new(MemorySessionStore::with_token("stale"));
    let auth = AuthService::new(client(&base, store.clone()));

    assert!(auth.hydrate().await.is_none());
    assert!(store.get().is_none());
}

// ============ Location ============

#[tokio::test]
async fn test_location_failures() {
    let (base, _) = spawn_backend().await;
    let api = client(&base, Arc::new(MemorySessionStore::with_token("t")));

    let watcher = LocationWatcher::new(Arc::new(ChannelSource::new()), Arc::new(api.clone()));
    let outcome = watcher.report("uid-1", LocationSample::now(-33.9, 18.4)).await;
    assert_eq!(outcome, UpdateOutcome::OutsideGeofence);
    assert_eq!(watcher.error(), None);

    let watcher = LocationWatcher::new(Arc::new(ChannelSource::new()), Arc::new(api.clone()));
    let outcome = watcher.report("broken", LocationSample::now(37.4, -122.1)).await;
    assert!(matches!(outcome, UpdateOutcome::Failed(f) if f.status == 500));
    assert_eq!(watcher.error().as_deref(), Some("Failed to update location"));

    let watcher = LocationWatcher::new(Arc::new(ChannelSource::new()), Arc::new(api));
    assert_eq!(
        watcher.report("uid-1", LocationSample::now(37.4, -122.1)).await,
        UpdateOutcome::Sent
    );
}

// ============ Real-time ============

#[tokio::test]
async fn test_websocket_round_trip() {
    let (base, state) = spawn_backend().await;
    let store = Arc::new(MemorySessionStore::with_token("tok-1"));
    let manager = ConnectionManager::with_websocket(socket_config(&base), store);

    let socket = manager.initialize(ada());
    let mut live = socket.on(Topic::ConversationMessage);
    assert!(timeout(Duration::from_secs(5), socket.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap());
    assert!(manager.is_connected());

    let ack = timeout(Duration::from_secs(5), socket.join_conversation("c1"))
        .await
        .unwrap();
    assert!(ack.ok);

    assert!(socket.send_message(&OutgoingMessage {
        conversation_id: "c1".to_string(),
        content: "hello".to_string(),
    }));
    let event = timeout(Duration::from_secs(5), live.recv()).await.unwrap().unwrap();
    assert_eq!(event.data["content"], "hello");
    assert_eq!(event.data["conversationId"], "c1");

    {
        let backend = state.lock().unwrap();
        assert_eq!(backend.socket_tokens, vec![Some("tok-1".to_string())]);
        assert_eq!(backend.socket_events[0], "user:register");
    }

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionState::Uninitialized);
    assert!(!socket.send_message(&OutgoingMessage {
        conversation_id: "c1".to_string(),
        content: "dropped".to_string(),
    }));
}

#[tokio::test]
async fn test_unreachable_socket_gives_up() {
    let config = RealtimeConfig {
        url: "ws://127.0.0.1:9/ws".to_string(),
        reconnection_attempts: 2,
        reconnection_delay: Duration::from_millis(20),
        ..RealtimeConfig::default()
    };
    let manager = ConnectionManager::with_websocket(config, Arc::new(MemorySessionStore::new()));
    let socket = manager.initialize(ada());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert!(!manager.is_connected());
    manager.disconnect();
}

// ============ Chat ============

#[tokio::test]
async fn test_chat_room_over_backend() {
    let (base, _) = spawn_backend().await;
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::with_token("t"));
    let api = client(&base, store.clone());
    let manager = ConnectionManager::with_websocket(socket_config(&base), store);
    let socket = manager.initialize(ada());
    timeout(Duration::from_secs(5), socket.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap();

    let room = ChatRoom::open(api, Arc::clone(&socket), "c1").await;
    assert_eq!(room.messages()[0].content, "earlier");

    match room.send("this has a badword").await.unwrap() {
        SendOutcome::Blocked(notice) => {
            assert_eq!(notice.action, "warn");
            assert_eq!(notice.flags, vec!["profanity"]);
        }
        other => panic!("expected a block, got {:?}", other),
    }

    match room.send("  see you at the library  ").await.unwrap() {
        SendOutcome::Sent(Some(m)) => assert_eq!(m.content, "see you at the library"),
        other => panic!("expected a sent message, got {:?}", other),
    }

    let ids: Vec<_> = room.messages().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["m0", "m-new"]);

    room.close();
    manager.disconnect();
}

#[tokio::test]
async fn test_conversation_list_load() {
    let (base, _) = spawn_backend().await;
    let api = client(&base, Arc::new(MemorySessionStore::with_token("t")));

    let mut list = ConversationList::new();
    assert_eq!(list.load(&api).await.unwrap(), 2);
    assert_eq!(list.total_unread_chats(), 1);
    assert_eq!(list.get("c2").unwrap().name.as_deref(), Some("Robotics Club"));

    list.mark_as_read(&api, "c1").await;
    assert_eq!(list.total_unread_chats(), 0);
}
