//! GPS Fix

use serde::{Deserialize, Serialize};

/// A single GPS position sample from the trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// Latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Offset from the start of the trace (ms)
    pub time_offset_ms: f64,
}

impl GpsFix {
    /// Fixed cadence of the GPS receiver (1 Hz)
    pub const INTERVAL_MS: f64 = 1000.0;

    /// Create a new fix
    pub fn new(latitude: f64, longitude: f64, time_offset_ms: f64) -> Self {
        Self {
            latitude,
            longitude,
            time_offset_ms,
        }
    }

    /// Create the fix for the Nth accepted trace line
    pub fn from_index(index: usize, latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, index as f64 * Self::INTERVAL_MS)
    }
}
