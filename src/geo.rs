//! # Geo Module
//!
//! Position fixes and great-circle distance between them.

use chrono::{DateTime, Utc};

/// Mean Earth radius used by the haversine formula, in km
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Conversion factor from m/s to km/h
pub const MPS_TO_KMH: f64 = 3.6;

/// A single position fix from the position provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Degrees, positive north
    pub latitude: f64,
    /// Degrees, positive east
    pub longitude: f64,
    /// Ground speed in m/s, `None` when the provider does not report one
    pub speed_mps: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl GeoFix {
    /// Instantaneous speed in whole km/h, 0 when the provider reports none
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps
            .map(|s| (s.max(0.0) * MPS_TO_KMH).round())
            .unwrap_or(0.0)
    }

    /// True when the provider reports forward motion
    pub fn is_moving(&self) -> bool {
        matches!(self.speed_mps, Some(s) if s > 0.0)
    }

    /// Distance from `other` to this fix, in km
    pub fn distance_from(&self, other: &GeoFix) -> f64 {
        distance_km(other.latitude, other.longitude, self.latitude, self.longitude)
    }
}

/// Great-circle distance between two coordinates (haversine), in km
///
/// # Examples
///
/// ```
/// use scooter_telemetry::geo::distance_km;
///
/// assert_eq!(distance_km(-23.55, -46.63, -23.55, -46.63), 0.0);
///
/// // One degree of latitude is roughly 111 km
/// let d = distance_km(0.0, 0.0, 1.0, 0.0);
/// assert!((d - 111.19).abs() < 0.01);
/// ```
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
