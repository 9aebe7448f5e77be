//! Location Module
//!
//! Background position updates: a movement gate, a watcher bound to the
//! sharing preference and the signed-in user, and the preference itself.

pub mod gate;
pub mod preference;
pub mod watcher;

pub use gate::{approx_distance_meters, LocationGate, LocationSample, MIN_INTERVAL_SECS, MIN_MOVE_METERS};
pub use preference::LocationPreference;
pub use watcher::{
    ChannelSource, GeoError, LocationSink, LocationSource, LocationWatcher, PositionStream,
    UpdateOutcome, UPDATE_FAILED_MESSAGE,
};
