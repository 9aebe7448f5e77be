//! API Result Types
//!
//! Every request made through [`super::ApiClient`] resolves to an
//! [`ApiResult`]: either the parsed body of a 2xx response or an
//! [`ApiFailure`] describing what went wrong. Nothing is raised past the
//! client for network or HTTP errors.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Message used when no response was received at all
pub const NETWORK_ERROR_MESSAGE: &str = "network error";

/// Fallback message when an error body carries no usable text
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong";

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSuccess {
    /// Parsed JSON body (`Null` for an empty body)
    pub data: Value,
    /// HTTP status code
    pub status: u16,
}

impl ApiSuccess {
    /// Deserialize the whole body into a typed value
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiFailure> {
        serde_json::from_value(self.data.clone()).map_err(|e| ApiFailure {
            message: format!("Unexpected response shape: {}", e),
            status: self.status,
            data: Some(self.data.clone()),
        })
    }

    /// Deserialize a single top-level field, if present and well-formed
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// A failed request: HTTP error status, unreadable body, or no response
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} (status {status})")]
pub struct ApiFailure {
    /// Human-readable message for display
    pub message: String,
    /// HTTP status, `0` when the server was never reached
    pub status: u16,
    /// Error body as returned by the server, with `details` normalized
    pub data: Option<Value>,
}

/// Outcome of an API call
pub type ApiResult = Result<ApiSuccess, ApiFailure>;

impl ApiFailure {
    /// Failure for a request that never got a response
    pub fn network() -> Self {
        Self {
            message: NETWORK_ERROR_MESSAGE.to_string(),
            status: 0,
            data: None,
        }
    }

    /// Build a failure from a non-2xx response body
    ///
    /// The message comes from `message`, then a string `error`, then a
    /// generic fallback. `details` is filled from `details` or `[error]`.
    pub fn from_response(status: u16, body: Value) -> Self {
        let Value::Object(mut map) = body else {
            return Self {
                message: DEFAULT_ERROR_MESSAGE.to_string(),
                status,
                data: if body.is_null() { None } else { Some(body) },
            };
        };

        let error_text = map.get("error").and_then(|v| v.as_str()).map(str::to_string);

        let message = map
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| error_text.clone())
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

        let details = match map.get("details") {
            Some(d) if !d.is_null() => d.clone(),
            _ => error_text.map(|e| Value::Array(vec![Value::String(e)])).unwrap_or(Value::Null),
        };
        map.insert("details".to_string(), details);

        Self {
            message,
            status,
            data: Some(Value::Object(map)),
        }
    }

    /// The server was never reached
    pub fn is_network_error(&self) -> bool {
        self.status == 0
    }

    /// The request was rejected for being outside the allowed campus zone
    ///
    /// This is an expected outcome for location updates and is neither
    /// logged as an error nor shown to the user.
    pub fn is_geofence_rejection(&self) -> bool {
        if mentions_geofence(&self.message) {
            return true;
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("error"))
            .and_then(|e| e.as_str())
            .map(mentions_geofence)
            .unwrap_or(false)
    }

    /// Validation details for inline display
    pub fn details(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("details"))
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn mentions_geofence(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("geofence") || text.contains("outside")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_prefers_message_field() {
        let f = ApiFailure::from_response(400, json!({"message": "Bad input", "error": "x"}));
        assert_eq!(f.message, "Bad input");
        assert_eq!(f.status, 400);
        assert_eq!(f.details(), vec!["x"]);
    }

    #[test]
    fn test_message_falls_back_to_error_string() {
        let f = ApiFailure::from_response(404, json!({"error": "No account found"}));
        assert_eq!(f.message, "No account found");
        assert_eq!(f.data.unwrap()["details"], json!(["No account found"]));
    }

    #[test]
    fn test_message_default() {
        let f = ApiFailure::from_response(500, json!({"ok": false}));
        assert_eq!(f.message, DEFAULT_ERROR_MESSAGE);
        assert!(f.details().is_empty());

        let f = ApiFailure::from_response(502, Value::Null);
        assert_eq!(f.message, DEFAULT_ERROR_MESSAGE);
        assert!(f.data.is_none());
    }

    #[test]
    fn test_validation_details_kept() {
        let f = ApiFailure::from_response(
            422,
            json!({"message": "Validation failed", "details": ["email is required", "name too short"]}),
        );
        assert_eq!(f.details(), vec!["email is required", "name too short"]);
    }

    #[test]
    fn test_network_failure() {
        let f = ApiFailure::network();
        assert!(f.is_network_error());
        assert_eq!(f.message, NETWORK_ERROR_MESSAGE);
        assert!(!f.is_geofence_rejection());
    }

    #[test]
    fn test_geofence_detection() {
        let f = ApiFailure::from_response(403, json!({"error": "Location outside campus geofence"}));
        assert!(f.is_geofence_rejection());

        let f = ApiFailure::from_response(403, json!({"message": "Forbidden", "error": "You are outside the allowed zone"}));
        assert!(f.is_geofence_rejection());

        let f = ApiFailure::from_response(500, json!({"error": "Database unavailable"}));
        assert!(!f.is_geofence_rejection());
    }

    #[test]
    fn test_success_field_access() {
        let ok = ApiSuccess {
            data: json!({"token": "abc", "count": 3}),
            status: 200,
        };
        assert_eq!(ok.field::<String>("token").as_deref(), Some("abc"));
        assert_eq!(ok.field::<u32>("count"), Some(3));
        assert_eq!(ok.field::<String>("missing"), None);
    }
}
