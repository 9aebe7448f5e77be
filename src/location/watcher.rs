//! Background location watcher
//!
//! Follows the device position while location sharing is enabled and a
//! user is signed in, and pushes gated updates to the backend. Turning
//! either condition off cancels the device subscription right away.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::gate::{LocationGate, LocationSample};
use crate::api::dto::LocationUpdate;
use crate::api::{ApiClient, ApiFailure};

/// Error text shown when an update is rejected for a reason other than
/// the campus geofence
pub const UPDATE_FAILED_MESSAGE: &str = "Failed to update location";

/// Device positioning errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeoError {
    #[error("Geolocation not supported")]
    Unsupported,

    #[error("{0}")]
    Failed(String),
}

/// Position fixes from a subscription; ends when the device stops it
pub type PositionStream = mpsc::UnboundedReceiver<Result<LocationSample, GeoError>>;

/// Source of device positions
pub trait LocationSource: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    /// Start a subscription; dropping the stream cancels it
    fn watch(&self) -> Result<PositionStream, GeoError>;
}

/// Destination of location updates
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn send_location(&self, user_id: &str, update: LocationUpdate) -> Result<(), ApiFailure>;
}

#[async_trait]
impl LocationSink for ApiClient {
    async fn send_location(&self, user_id: &str, update: LocationUpdate) -> Result<(), ApiFailure> {
        self.users().update_location(user_id, update).await.map(|_| ())
    }
}

/// Positions pushed by hand
///
/// Used by the command-line front-end and in tests. Each `watch` replaces
/// the previous subscription.
pub struct ChannelSource {
    supported: bool,
    current: Mutex<Option<mpsc::UnboundedSender<Result<LocationSample, GeoError>>>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self {
            supported: true,
            current: Mutex::new(None),
        }
    }

    /// A source on a device without positioning
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Result<LocationSample, GeoError>>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a fix; `false` if nobody is watching
    pub fn push(&self, sample: LocationSample) -> bool {
        self.current()
            .as_ref()
            .map(|tx| tx.send(Ok(sample)).is_ok())
            .unwrap_or(false)
    }

    /// Deliver a positioning error
    pub fn fail(&self, error: GeoError) -> bool {
        self.current()
            .as_ref()
            .map(|tx| tx.send(Err(error)).is_ok())
            .unwrap_or(false)
    }

    /// Whether a subscription is live
    pub fn is_watched(&self) -> bool {
        self.current().as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSource for ChannelSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn watch(&self) -> Result<PositionStream, GeoError> {
        if !self.supported {
            return Err(GeoError::Unsupported);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current() = Some(tx);
        Ok(rx)
    }
}

/// What happened to one position fix
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Too close in space and time to the last sent fix
    Skipped,
    Sent,
    /// Rejected because the user is off campus
    OutsideGeofence,
    Failed(ApiFailure),
}

struct Shared {
    sink: Arc<dyn LocationSink>,
    gate: Mutex<LocationGate>,
    error: watch::Sender<Option<String>>,
}

impl Shared {
    async fn report(&self, user_id: &str, sample: LocationSample) -> UpdateOutcome {
        let passed = self.gate.lock().unwrap_or_else(|e| e.into_inner()).offer(sample);
        if !passed {
            return UpdateOutcome::Skipped;
        }

        let update = LocationUpdate {
            lat: sample.latitude,
            lng: sample.longitude,
        };

        match self.sink.send_location(user_id, update).await {
            Ok(()) => {
                tracing::debug!(user_id, lat = update.lat, lng = update.lng, "Location updated");
                UpdateOutcome::Sent
            }
            Err(f) if f.is_geofence_rejection() => {
                tracing::debug!(user_id, "Location outside campus geofence");
                UpdateOutcome::OutsideGeofence
            }
            Err(f) => {
                tracing::error!(user_id, status = f.status, error = %f.message, "Location update failed");
                self.error.send_replace(Some(UPDATE_FAILED_MESSAGE.to_string()));
                UpdateOutcome::Failed(f)
            }
        }
    }
}

pub struct LocationWatcher {
    source: Arc<dyn LocationSource>,
    shared: Arc<Shared>,
    enabled: bool,
    user_id: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl LocationWatcher {
    pub fn new(source: Arc<dyn LocationSource>, sink: Arc<dyn LocationSink>) -> Self {
        Self::with_gate(source, sink, LocationGate::default())
    }

    pub fn with_gate(
        source: Arc<dyn LocationSource>,
        sink: Arc<dyn LocationSink>,
        gate: LocationGate,
    ) -> Self {
        let initial = if source.is_supported() {
            None
        } else {
            Some(GeoError::Unsupported.to_string())
        };
        let (error, _) = watch::channel(initial);

        Self {
            source,
            shared: Arc::new(Shared {
                sink,
                gate: Mutex::new(gate),
                error,
            }),
            enabled: false,
            user_id: None,
            task: None,
        }
    }

    /// Follow the location sharing preference
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.reconcile(false);
        }
    }

    /// Follow the signed-in user
    pub fn set_user(&mut self, user_id: Option<String>) {
        if self.user_id != user_id {
            self.user_id = user_id;
            self.reconcile(true);
        }
    }

    /// Whether a device subscription is running
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Visible error, if any
    pub fn error(&self) -> Option<String> {
        self.shared.error.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.shared.error.subscribe()
    }

    /// Gate and send one fix for `user_id`
    pub async fn report(&self, user_id: &str, sample: LocationSample) -> UpdateOutcome {
        self.shared.report(user_id, sample).await
    }

    fn reconcile(&mut self, user_changed: bool) {
        let Some(user_id) = self.user_id.clone().filter(|_| self.enabled) else {
            self.stop();
            return;
        };

        if self.is_active() && !user_changed {
            return;
        }
        self.stop();

        if !self.source.is_supported() {
            return;
        }

        match self.source.watch() {
            Ok(stream) => {
                tracing::info!(user_id = %user_id, "Location watch started");
                self.task = Some(tokio::spawn(follow(Arc::clone(&self.shared), user_id, stream)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Geolocation error");
                self.shared.error.send_replace(Some(e.to_string()));
            }
        }
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Location watch stopped");
        }
    }
}

impl Drop for LocationWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn follow(shared: Arc<Shared>, user_id: String, mut stream: PositionStream) {
    while let Some(fix) = stream.recv().await {
        match fix {
            // In-flight updates outlive the watch
            Ok(sample) => {
                let shared = Arc::clone(&shared);
                let user_id = user_id.clone();
                tokio::spawn(async move {
                    shared.report(&user_id, sample).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Geolocation error");
                shared.error.send_replace(Some(e.to_string()));
                break;
            }
        }
    }
}
