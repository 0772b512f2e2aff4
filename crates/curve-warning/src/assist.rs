//! Curve Warning Assist Implementation

use segmentation::{CurveDirection, GeoPoint, SegmentLibrary, SegmentType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Warning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    /// Distance at or below which a curve is immediate (m)
    pub immediate_distance_m: f64,
    /// Distance at or below which to prepare for a curve (m)
    pub prepare_distance_m: f64,
    /// Recorded average speed below which to suggest slowing (km/h)
    pub reduce_speed_below_kmh: f64,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            immediate_distance_m: 50.0,
            prepare_distance_m: 100.0,
            reduce_speed_below_kmh: 30.0,
        }
    }
}

/// Urgency of a curve warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningBand {
    Immediate,
    Prepare,
    Notice,
}

/// The segment ahead and how far away it is
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingSegment {
    pub segment_type: SegmentType,
    pub direction: CurveDirection,
    pub start_time_ms: f64,
    pub distance_m: f64,
    pub band: WarningBand,
    pub reduce_speed: bool,
}

/// Result of one assist update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Advisory {
    NoUpcoming,
    Upcoming(UpcomingSegment),
}

impl Advisory {
    /// Band of the upcoming curve, if any
    pub fn band(&self) -> Option<WarningBand> {
        match self {
            Advisory::Upcoming(upcoming) if upcoming.segment_type == SegmentType::Curve => {
                Some(upcoming.band)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let upcoming = match self {
            Advisory::NoUpcoming => return write!(f, "ADAS: No upcoming segments detected"),
            Advisory::Upcoming(upcoming) => upcoming,
        };

        write!(f, "Next {}: {:.1}m", upcoming.segment_type, upcoming.distance_m)?;
        if upcoming.segment_type == SegmentType::Curve {
            write!(f, " ({})", upcoming.direction)?;
            match upcoming.band {
                WarningBand::Immediate => write!(f, " [!] IMMEDIATE CURVE")?,
                WarningBand::Prepare => write!(f, " [!] PREPARE FOR CURVE")?,
                WarningBand::Notice => {}
            }
            if upcoming.reduce_speed {
                write!(f, " - Reduce speed")?;
            }
        }
        Ok(())
    }
}

/// Warns about segments recorded on a previous run
pub struct CurveWarningAssist {
    config: WarningConfig,
    library: Arc<SegmentLibrary>,
    last: Advisory,
    warnings_issued: usize,
}

impl CurveWarningAssist {
    /// Create an assist over a frozen library
    pub fn new(config: WarningConfig, library: Arc<SegmentLibrary>) -> Self {
        info!(
            "Curve warning assist ready with {} recorded segments",
            library.len()
        );
        Self {
            config,
            library,
            last: Advisory::NoUpcoming,
            warnings_issued: 0,
        }
    }

    /// Compute the advisory for the current position and simulation time
    pub fn update(&mut self, position: impl Into<GeoPoint>, time_ms: f64) -> Advisory {
        let position = position.into();

        let advisory = match self.library.find_nearest_upcoming(position, time_ms) {
            Some((segment, distance_m)) => {
                let is_curve = segment.segment_type == SegmentType::Curve;
                Advisory::Upcoming(UpcomingSegment {
                    segment_type: segment.segment_type,
                    direction: segment.direction,
                    start_time_ms: segment.start_time_ms,
                    distance_m,
                    band: self.band_for(distance_m),
                    reduce_speed: is_curve
                        && segment.average_speed_kmh < self.config.reduce_speed_below_kmh,
                })
            }
            None => Advisory::NoUpcoming,
        };

        if matches!(advisory.band(), Some(WarningBand::Immediate | WarningBand::Prepare)) {
            self.warnings_issued += 1;
        }
        debug!("{}", advisory);

        self.last = advisory.clone();
        advisory
    }

    /// Band for a distance to the next segment
    pub fn band_for(&self, distance_m: f64) -> WarningBand {
        if distance_m <= self.config.immediate_distance_m {
            WarningBand::Immediate
        } else if distance_m <= self.config.prepare_distance_m {
            WarningBand::Prepare
        } else {
            WarningBand::Notice
        }
    }

    /// Segment found by the latest update
    pub fn upcoming(&self) -> Option<&UpcomingSegment> {
        match &self.last {
            Advisory::Upcoming(upcoming) => Some(upcoming),
            Advisory::NoUpcoming => None,
        }
    }

    /// Immediate or prepare curve warnings issued so far
    pub fn warnings_issued(&self) -> usize {
        self.warnings_issued
    }
}
