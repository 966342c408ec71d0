//! Coordinates and distance/ETA arithmetic.
//!
//! Everything here is pure and deterministic: identical inputs always
//! produce bit-identical outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default walking speed used for ETA estimates.
pub const DEFAULT_WALKING_SPEED_KMH: f64 = 5.0;

/// Label used when the estimate rounds to zero minutes.
pub const UNDER_ONE_MINUTE: &str = "< 1 min";

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
}

impl GeoCoordinate {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check the coordinate lies within the WGS84 ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        distance_meters(*self, *other)
    }

    /// Initial bearing towards `other`, in degrees clockwise from north.
    #[must_use]
    pub fn bearing_to(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// The point reached by travelling `distance_m` along `bearing_deg`.
    #[must_use]
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> Self {
        let angular = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        Self::new(lat2.to_degrees(), lon2.to_degrees())
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

impl From<[f64; 2]> for GeoCoordinate {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self::new(lat, lon)
    }
}

/// Haversine distance between two coordinates, in meters.
///
/// Symmetric in its arguments and zero for identical points.
#[must_use]
pub fn distance_meters(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    // Absolute deltas keep the result bit-identical when a and b swap.
    let dlat = (b.lat - a.lat).abs().to_radians();
    let dlon = (b.lon - a.lon).abs().to_radians();
    let lat1 = a.lat.to_radians().cos();
    let lat2 = b.lat.to_radians().cos();

    let h = (dlat / 2.0).sin().powi(2) + (lat1 * lat2) * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Whole walking minutes needed to cover `distance_m` at `walking_speed_kmh`.
///
/// Negative or non-finite distances count as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn walking_minutes(distance_m: f64, walking_speed_kmh: f64) -> u64 {
    let distance_m = if distance_m.is_finite() {
        distance_m.max(0.0)
    } else {
        0.0
    };
    let minutes = (distance_m / 1000.0 / walking_speed_kmh * 60.0).round();
    if minutes.is_finite() {
        minutes as u64
    } else {
        0
    }
}

/// ETA label for `distance_m` at `walking_speed_kmh`, e.g. `"4 min"` or `"< 1 min"`.
#[must_use]
pub fn estimate_minutes(distance_m: f64, walking_speed_kmh: f64) -> String {
    format_minutes(walking_minutes(distance_m, walking_speed_kmh))
}

/// Format a whole number of minutes as an ETA label.
#[must_use]
pub fn format_minutes(minutes: u64) -> String {
    if minutes == 0 {
        UNDER_ONE_MINUTE.to_string()
    } else {
        format!("{minutes} min")
    }
}
