//! Location sharing preference
//!
//! The profile on the backend is authoritative. Changes apply locally
//! first and are reverted when the backend refuses them.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::dto::ProfileResponse;
use crate::api::{ApiClient, ApiFailure};
use crate::session::FileSessionStore;

pub struct LocationPreference {
    api: ApiClient,
    enabled: watch::Sender<bool>,
    cache: Option<Arc<FileSessionStore>>,
}

impl LocationPreference {
    pub fn new(api: ApiClient) -> Self {
        let (enabled, _) = watch::channel(false);
        Self {
            api,
            enabled,
            cache: None,
        }
    }

    /// Remember confirmed values in a session file
    pub fn with_cache(mut self, cache: Arc<FileSessionStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.enabled.subscribe()
    }

    /// Last confirmed value from the cache, if any
    pub fn cached(&self) -> Option<bool> {
        self.cache.as_ref().and_then(|c| c.location_enabled())
    }

    /// Load the preference for the signed-in user
    ///
    /// Signed out or an unreachable profile means off. A profile response
    /// without a profile leaves the current value alone.
    pub async fn load(&self, signed_in: bool) -> bool {
        if !signed_in {
            self.enabled.send_replace(false);
            return false;
        }

        match self.api.users().profile().await {
            Ok(success) => {
                let body: ProfileResponse = success.parse().unwrap_or_default();
                if let Some(profile) = body.profile {
                    let value = profile.location_enabled == Some(true);
                    self.enabled.send_replace(value);
                    self.remember(value);
                }
            }
            Err(f) => {
                tracing::warn!(status = f.status, "Could not load location preference");
                self.enabled.send_replace(false);
            }
        }

        self.enabled()
    }

    /// Change the preference for `user_id`
    pub async fn set_enabled(&self, user_id: &str, enabled: bool) -> Result<(), ApiFailure> {
        self.enabled.send_replace(enabled);

        let result = self
            .api
            .users()
            .update_profile(user_id, &json!({ "locationEnabled": enabled }))
            .await;

        match result {
            Ok(_) => {
                tracing::info!(user_id, enabled, "Location sharing updated");
                self.remember(enabled);
                Ok(())
            }
            Err(f) => {
                tracing::warn!(user_id, enabled, error = %f.message, "Reverting location sharing change");
                self.enabled.send_replace(!enabled);
                Err(f)
            }
        }
    }

    fn remember(&self, enabled: bool) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_location_enabled(enabled) {
                tracing::warn!(error = %e, "Failed to cache location preference");
            }
        }
    }
}
