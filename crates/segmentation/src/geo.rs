//! Spherical geometry helpers

use can_protocol::GpsFix;
use serde::{Deserialize, Serialize};

/// Mean Earth radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<GpsFix> for GeoPoint {
    fn from(fix: GpsFix) -> Self {
        Self::new(fix.latitude, fix.longitude)
    }
}

impl From<&GpsFix> for GeoPoint {
    fn from(fix: &GpsFix) -> Self {
        Self::new(fix.latitude, fix.longitude)
    }
}

/// Great-circle distance in meters
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Forward bearing from `from` to `to`, in [0, 360)
pub fn bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Fold an angle difference into [-180, 180)
pub fn normalize_delta(delta_deg: f64) -> f64 {
    let folded = (delta_deg + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to the modulus itself
    if folded >= 180.0 {
        folded - 360.0
    } else {
        folded
    }
}
