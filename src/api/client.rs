//! CampusConnect REST API Client
//!
//! HTTP client for communicating with the CampusConnect backend.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::error::{ApiFailure, ApiResult, ApiSuccess};
use crate::session::SessionStore;

/// REST API client
///
/// Attaches the stored bearer token to every request and normalizes every
/// outcome into an [`ApiResult`]. There are no retries, timeouts or
/// cancellation; callers re-issue requests themselves.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
    store: Arc<dyn SessionStore>,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the backend (e.g., "http://localhost:5001")
    pub base_url: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
        }
    }
}

impl ApiClient {
    /// Create a new client reading its token from `store`
    pub fn new(config: ApiClientConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            client: Client::new(),
            config,
            store,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// The token store this client reads from
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Full URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Perform a request and normalize the outcome
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult {
        let url = self.url(path);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = self.store.get() {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "API request failed");
                return Err(ApiFailure::network());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Failed to read API response");
                return Err(ApiFailure::network());
            }
        };

        let parsed = if text.trim().is_empty() {
            Some(Value::Null)
        } else {
            serde_json::from_str::<Value>(&text).ok()
        };

        if status.is_success() {
            return match parsed {
                Some(data) => Ok(ApiSuccess {
                    data,
                    status: status.as_u16(),
                }),
                None => {
                    tracing::error!(method = %method, path = %path, status = status.as_u16(), "API returned a non-JSON body");
                    Err(ApiFailure {
                        message: "Invalid response body".to_string(),
                        status: status.as_u16(),
                        data: Some(Value::String(text)),
                    })
                }
            };
        }

        let body = parsed.unwrap_or(Value::String(text));
        let failure = ApiFailure::from_response(status.as_u16(), body);

        if failure.is_geofence_rejection() {
            tracing::debug!(method = %method, path = %path, status = failure.status, "Request rejected by geofence");
        } else {
            tracing::error!(
                method = %method,
                path = %path,
                status = failure.status,
                error_message = %failure.message,
                "API error"
            );
        }

        Err(failure)
    }

    /// GET request
    pub async fn get(&self, path: &str) -> ApiResult {
        self.request(Method::GET, path, None).await
    }

    /// POST request with a JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult {
        let body = encode(body)?;
        self.request(Method::POST, path, Some(body)).await
    }

    /// PUT request with a JSON body
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult {
        let body = encode(body)?;
        self.request(Method::PUT, path, Some(body)).await
    }

    /// PATCH request with a JSON body
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult {
        let body = encode(body)?;
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// DELETE request
    pub async fn delete(&self, path: &str) -> ApiResult {
        self.request(Method::DELETE, path, None).await
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiFailure> {
    serde_json::to_value(body).map_err(|e| ApiFailure {
        message: format!("Failed to encode request body: {}", e),
        status: 0,
        data: None,
    })
}
