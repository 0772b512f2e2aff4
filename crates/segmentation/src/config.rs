//! Classifier configuration

use serde::{Deserialize, Serialize};

/// Segment classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Samples kept in each sliding window
    pub window_size: usize,

    /// Consecutive above-threshold samples required for a curve
    pub min_consecutive: usize,

    /// Yaw rate magnitude threshold (°/s)
    pub yaw_threshold_dps: f64,

    /// Steering angle magnitude threshold (°)
    pub steer_threshold_deg: f64,

    /// Minimum time between committed state changes (ms)
    pub min_hold_ms: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_consecutive: 3,
            yaw_threshold_dps: 2.0,
            steer_threshold_deg: 15.0,
            min_hold_ms: 500.0,
        }
    }
}
