//! Geographic positions, GPS fixes and navigation destinations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl LatLng {
    /// Create a new coordinate without validation
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Create a coordinate, rejecting values outside the WGS84 range
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self> {
        let lat_lng = Self::new(latitude, longitude);
        if lat_lng.is_valid() {
            Ok(lat_lng)
        } else {
            Err(CoreError::InvalidCoordinate {
                lat: latitude,
                lon: longitude,
            })
        }
    }

    /// Check that both components are finite and in range
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another coordinate in meters (Haversine formula)
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }

    /// Initial bearing towards another coordinate in degrees [0, 360)
    pub fn bearing_to(&self, other: &LatLng) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// Coordinate reached by travelling `distance_m` along `bearing_deg`
    pub fn offset(&self, bearing_deg: f64, distance_m: f64) -> LatLng {
        let delta = distance_m / EARTH_RADIUS_M;
        let theta = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

        let longitude = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
        LatLng::new(lat2.to_degrees(), longitude)
    }

    /// Linear interpolation between two coordinates, `t` in [0, 1]
    pub fn lerp(&self, other: &LatLng, t: f64) -> LatLng {
        LatLng::new(
            self.latitude + t * (other.latitude - self.latitude),
            self.longitude + t * (other.longitude - self.longitude),
        )
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A single fix from the location source
///
/// All optional fields may be missing on any given fix; consumers must not
/// assume a provider reports heading or speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Position of the fix
    pub lat_lng: LatLng,
    /// Altitude in meters
    pub altitude: Option<f64>,
    /// Heading in degrees clockwise from true north
    pub heading: Option<f64>,
    /// Ground speed in meters per second
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<f64>,
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
    /// Provider tag, e.g. "gps" or "fused"
    pub provider: Option<String>,
}

impl Location {
    /// Create a fix with only a position
    pub fn new(lat_lng: LatLng, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat_lng,
            altitude: None,
            heading: None,
            speed: None,
            accuracy: None,
            timestamp,
            provider: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Check the fix is usable: valid position and sane optional fields
    pub fn is_valid(&self) -> bool {
        let non_negative = |v: Option<f64>| v.map_or(true, |v| v.is_finite() && v >= 0.0);
        let finite = |v: Option<f64>| v.map_or(true, f64::is_finite);

        self.lat_lng.is_valid()
            && non_negative(self.speed)
            && non_negative(self.accuracy)
            && finite(self.heading)
            && finite(self.altitude)
    }

    /// Speed if reported and at least `floor` m/s
    pub fn speed_above(&self, floor: f64) -> Option<f64> {
        self.speed.filter(|s| s.is_finite() && *s >= floor)
    }
}

/// Where the user wants to go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Unique destination identifier
    pub id: Uuid,
    /// Target coordinate
    pub lat_lng: LatLng,
    /// Optional human-readable label
    pub label: Option<String>,
}

impl Destination {
    /// Create a destination from a bare coordinate
    pub fn from_lat_lng(lat_lng: LatLng) -> Self {
        Self {
            id: Uuid::new_v4(),
            lat_lng,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} {}", label, self.lat_lng),
            None => write!(f, "{}", self.lat_lng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let sf = LatLng::new(37.7749, -122.4194);
        let la = LatLng::new(34.0522, -118.2437);

        let distance = sf.distance_to(&la);
        // Approximately 559 km
        assert!((distance - 559_000.0).abs() < 10_000.0);
    }

    #[test]
    fn test_bearing_cardinal() {
        let origin = LatLng::new(0.0, 0.0);
        assert!((origin.bearing_to(&LatLng::new(0.0, 1.0)) - 90.0).abs() < 0.1);
        assert!(origin.bearing_to(&LatLng::new(1.0, 0.0)).abs() < 0.1);
    }

    #[test]
    fn test_offset_round_trip_distance() {
        let origin = LatLng::new(48.2082, 16.3738);
        let moved = origin.offset(45.0, 200.0);
        assert!((origin.distance_to(&moved) - 200.0).abs() < 0.5);
        assert!((origin.bearing_to(&moved) - 45.0).abs() < 0.5);
    }

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert!(LatLng::checked(91.0, 0.0).is_err());
        assert!(LatLng::checked(0.0, f64::NAN).is_err());
        assert!(LatLng::checked(45.0, 120.0).is_ok());
    }

    #[test]
    fn test_location_validity() {
        let now = Utc::now();
        let fix = Location::new(LatLng::new(1.0, 1.0), now).with_speed(5.0);
        assert!(fix.is_valid());

        let negative_speed = Location::new(LatLng::new(1.0, 1.0), now).with_speed(-1.0);
        assert!(!negative_speed.is_valid());

        let bad_heading = Location::new(LatLng::new(1.0, 1.0), now).with_heading(f64::INFINITY);
        assert!(!bad_heading.is_valid());
    }

    #[test]
    fn test_speed_above_floor() {
        let fix = Location::new(LatLng::new(0.0, 0.0), Utc::now()).with_speed(0.4);
        assert_eq!(fix.speed_above(1.0), None);
        assert_eq!(fix.speed_above(0.1), Some(0.4));
    }
}
