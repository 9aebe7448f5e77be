//! Proximity Notifications
//!
//! Turns `proximity:nearby-match` events into short notices for the
//! signed-in user.

use std::sync::Arc;

use crate::realtime::{ProximityMatch, RealtimeClient, ServerEvent, Subscription, Topic};

/// Name shown when the other user has no display name
const UNKNOWN_NAME: &str = "Someone";

/// A nearby user worth telling about
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyNotice {
    /// The other user, when the payload names one
    pub user_id: Option<String>,
    pub display_name: String,
    /// Rounded distance, `0` when unknown
    pub distance_meters: u64,
}

impl NearbyNotice {
    /// Build a notice for `user_id`; `None` if the match does not involve them
    pub fn from_match(user_id: &str, m: &ProximityMatch) -> Option<Self> {
        if !m.users.iter().any(|u| u == user_id) {
            return None;
        }

        let other = m.users.iter().find(|u| *u != user_id).cloned();
        let display_name = other
            .as_ref()
            .and_then(|id| m.profiles.get(id))
            .and_then(|p| p.display_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        let distance_meters = match m.distance_meters {
            Some(d) if d > 0.0 => d.round() as u64,
            _ => 0,
        };

        Some(Self {
            user_id: other,
            display_name,
            distance_meters,
        })
    }

    pub fn text(&self) -> String {
        format!("{} is nearby (within {}m)", self.display_name, self.distance_meters)
    }
}

impl std::fmt::Display for NearbyNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Listens for proximity matches involving one user
pub struct ProximityListener {
    socket: Arc<RealtimeClient>,
    user_id: String,
    subscription: Subscription,
}

impl ProximityListener {
    pub fn new(socket: Arc<RealtimeClient>, user_id: &str) -> Self {
        let subscription = socket.on(Topic::ProximityMatch);
        Self {
            socket,
            user_id: user_id.to_string(),
            subscription,
        }
    }

    /// Wait for the next notice; `None` once the socket is closed
    pub async fn next(&mut self) -> Option<NearbyNotice> {
        while let Some(event) = self.subscription.recv().await {
            if let Some(notice) = self.notice(&event) {
                return Some(notice);
            }
        }
        None
    }

    fn notice(&self, event: &ServerEvent) -> Option<NearbyNotice> {
        let m: ProximityMatch = event.payload()?;
        let notice = NearbyNotice::from_match(&self.user_id, &m)?;
        tracing::info!(other = ?notice.user_id, distance_meters = notice.distance_meters, "Nearby match");
        Some(notice)
    }
}

impl Drop for ProximityListener {
    fn drop(&mut self) {
        self.socket.off(self.subscription.id());
    }
}
