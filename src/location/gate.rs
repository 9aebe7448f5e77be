//! Movement gate for location updates
//!
//! Decides whether a fresh position fix is worth sending. Only the last
//! sent sample is kept.

use chrono::{DateTime, Duration, Utc};

/// Meters per degree of latitude in the planar approximation
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Default minimum displacement before another update is sent
pub const MIN_MOVE_METERS: f64 = 25.0;

/// Default minimum time between updates when not moving
pub const MIN_INTERVAL_SECS: i64 = 60;

/// A position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            captured_at,
        }
    }

    /// Fix taken now
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, Utc::now())
    }
}

/// Approximate distance in meters between two points
///
/// Equirectangular projection around the mean latitude; good enough for
/// the few hundred meters that matter here.
pub fn approx_distance_meters(a: &LocationSample, b: &LocationSample) -> f64 {
    let lat_meters = (b.latitude - a.latitude) * METERS_PER_DEGREE;
    let mean_lat = ((a.latitude + b.latitude) / 2.0).to_radians();
    let lng_meters = (b.longitude - a.longitude) * METERS_PER_DEGREE * mean_lat.cos();
    (lat_meters * lat_meters + lng_meters * lng_meters).sqrt()
}

#[derive(Debug, Clone)]
pub struct LocationGate {
    min_distance_meters: f64,
    min_interval: Duration,
    last_sent: Option<LocationSample>,
}

impl Default for LocationGate {
    fn default() -> Self {
        Self::new(MIN_MOVE_METERS, Duration::seconds(MIN_INTERVAL_SECS))
    }
}

impl LocationGate {
    pub fn new(min_distance_meters: f64, min_interval: Duration) -> Self {
        Self {
            min_distance_meters,
            min_interval,
            last_sent: None,
        }
    }

    pub fn last_sent(&self) -> Option<&LocationSample> {
        self.last_sent.as_ref()
    }

    /// Whether `sample` moved far enough or came late enough
    pub fn should_send(&self, sample: &LocationSample) -> bool {
        let Some(last) = &self.last_sent else {
            return true;
        };

        let moved = approx_distance_meters(last, sample);
        let elapsed = sample.captured_at - last.captured_at;
        moved >= self.min_distance_meters || elapsed >= self.min_interval
    }

    /// Check a sample and, if it passes, record it as the last sent one
    pub fn offer(&mut self, sample: LocationSample) -> bool {
        if !self.should_send(&sample) {
            return false;
        }
        self.last_sent = Some(sample);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, lat: f64, lng: f64) -> LocationSample {
        let base = Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap();
        LocationSample::new(lat, lng, base + Duration::seconds(secs))
    }

    #[test]
    fn test_first_sample_always_sent() {
        let mut gate = LocationGate::default();
        assert!(gate.offer(at(0, 37.0, -122.0)));
        assert_eq!(gate.last_sent().unwrap().latitude, 37.0);
    }

    #[test]
    fn test_small_move_soon_after_is_skipped() {
        let mut gate = LocationGate::default();
        gate.offer(at(0, 37.0, -122.0));

        // ~11 m north, 10 s later
        assert!(!gate.offer(at(10, 37.0001, -122.0)));
        assert_eq!(gate.last_sent().unwrap().captured_at, at(0, 0.0, 0.0).captured_at);
    }

    #[test]
    fn test_large_move_is_sent() {
        let mut gate = LocationGate::default();
        gate.offer(at(0, 37.0, -122.0));

        // ~33 m north, 5 s later
        let moved = at(5, 37.0003, -122.0);
        assert!(gate.offer(moved));
        assert_eq!(gate.last_sent(), Some(&moved));

        // Distance now counts from the new reference
        assert!(!gate.offer(at(10, 37.0004, -122.0)));
    }

    #[test]
    fn test_interval_elapsed_is_sent() {
        let mut gate = LocationGate::default();
        gate.offer(at(0, 37.0, -122.0));

        assert!(!gate.offer(at(59, 37.0, -122.0)));
        let later = at(60, 37.0, -122.0);
        assert!(gate.offer(later));
        assert_eq!(gate.last_sent(), Some(&later));

        // The interval restarts from the new reference
        assert!(!gate.offer(at(100, 37.0, -122.0)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut gate = LocationGate::new(25.0, Duration::seconds(30));
        gate.offer(at(0, 10.0, 10.0));
        assert!(gate.should_send(&at(30, 10.0, 10.0)));
        assert!(!gate.should_send(&at(29, 10.0, 10.0)));
    }

    #[test]
    fn test_longitude_shrinks_with_latitude() {
        let equator = approx_distance_meters(&at(0, 0.0, 0.0), &at(0, 0.0, 0.001));
        let north = approx_distance_meters(&at(0, 60.0, 0.0), &at(0, 60.0, 0.001));

        assert!((equator - 111.0).abs() < 0.01);
        assert!((north - 55.5).abs() < 0.1);
    }
}
