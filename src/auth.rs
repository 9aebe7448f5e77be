//! Authentication
//!
//! Session lifecycle on top of the REST client: sign up, log in, hydrate a
//! stored token at start-up, log out. The token lives in the
//! [`SessionStore`]; the signed-in user and role are kept in memory only.

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::dto::{AuthResponse, LoginRequest, MeResponse, RegisterRequest, User};
use crate::api::{ApiClient, ApiFailure, ApiResult};
use crate::session::SessionStore;

/// Role of a visitor with no session
pub const GUEST_ROLE: &str = "guest";

/// In-memory view of the current session
#[derive(Debug, Clone)]
pub struct AuthState {
    pub user: Option<User>,
    pub role: String,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            role: GUEST_ROLE.to_string(),
        }
    }
}

/// Failed login or registration
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{code}: {message}")]
pub struct AuthError {
    /// Stable code for mapping to user-facing copy
    pub code: &'static str,
    pub message: String,
}

/// Manages the signed-in session
pub struct AuthService {
    api: ApiClient,
    state: Arc<RwLock<AuthState>>,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(AuthState::default())),
        }
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.api.session_store()
    }

    /// Register a new account and start a session
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<User, AuthError> {
        let result = self
            .api
            .post(
                "/api/auth/register",
                &RegisterRequest {
                    email,
                    password,
                    name,
                },
            )
            .await;
        self.start_session(result, "backend/register-failed").await
    }

    /// Log in with email and password and start a session
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let result = self
            .api
            .post("/api/auth/login", &LoginRequest { email, password })
            .await;
        self.start_session(result, "backend/login-failed").await
    }

    async fn start_session(&self, result: ApiResult, code: &'static str) -> Result<User, AuthError> {
        let success = result.map_err(|f| AuthError {
            code,
            message: failure_text(&f),
        })?;

        let body: AuthResponse = success.parse().unwrap_or_default();
        let token = body.token.ok_or_else(|| AuthError {
            code,
            message: success
                .field::<String>("error")
                .unwrap_or_else(|| format!("HTTP {}", success.status)),
        })?;

        self.store().set(&token).map_err(|e| AuthError {
            code: "session/store-failed",
            message: e.to_string(),
        })?;

        let user = body.user.unwrap_or_else(|| User {
            uid: String::new(),
            email: None,
            display_name: None,
            role: None,
        });

        let mut state = self.state.write().await;
        state.role = user.role_or_default().to_string();
        state.user = Some(user.clone());

        tracing::info!(uid = %user.uid, role = %state.role, "Session started");
        Ok(user)
    }

    /// Restore the session from a stored token
    ///
    /// A rejected token is removed from storage. A network failure leaves
    /// the token in place and the session signed out.
    pub async fn hydrate(&self) -> Option<User> {
        if self.store().get().is_none() {
            *self.state.write().await = AuthState::default();
            return None;
        }

        match self.api.auth().me().await {
            Ok(success) => {
                let body: MeResponse = success.parse().unwrap_or_default();
                match body.user {
                    Some(user) if body.success => {
                        let mut state = self.state.write().await;
                        state.role = user.role_or_default().to_string();
                        state.user = Some(user.clone());
                        tracing::info!(uid = %user.uid, "Session restored");
                        Some(user)
                    }
                    _ => {
                        self.drop_token();
                        *self.state.write().await = AuthState::default();
                        None
                    }
                }
            }
            Err(f) if f.is_network_error() => {
                tracing::warn!("Could not reach backend to restore session");
                *self.state.write().await = AuthState::default();
                None
            }
            Err(f) => {
                tracing::info!(status = f.status, "Stored token rejected");
                self.drop_token();
                *self.state.write().await = AuthState::default();
                None
            }
        }
    }

    /// End the session; backend errors are ignored
    pub async fn logout(&self) {
        if self.store().get().is_some() {
            if let Err(f) = self.api.post("/api/auth/logout", &json!({})).await {
                tracing::debug!(status = f.status, "Logout request failed, clearing local session anyway");
            }
        }
        self.drop_token();
        *self.state.write().await = AuthState::default();
        tracing::info!("Session ended");
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn role(&self) -> String {
        self.state.read().await.role.clone()
    }

    pub async fn is_admin(&self) -> bool {
        self.state.read().await.role == "admin"
    }

    /// Stored token, if any
    pub fn token(&self) -> Option<String> {
        self.store().get()
    }

    fn drop_token(&self) {
        if let Err(e) = self.store().clear() {
            tracing::warn!(error = %e, "Failed to clear stored token");
        }
    }
}

/// Text for a failed auth call: the body's `error`, else the HTTP status
fn failure_text(f: &ApiFailure) -> String {
    if f.is_network_error() {
        return f.message.clone();
    }
    f.data
        .as_ref()
        .and_then(|d| d.get("error"))
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", f.status))
}
