//! Road segments: open accumulator and closed summary

use crate::geo::{haversine_m, normalize_delta, GeoPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this many degrees the heading estimate is replaced by yaw integration
const MIN_HEADING_CHANGE_DEG: f64 = 0.1;

/// Segment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentType {
    #[default]
    Straight,
    Curve,
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentType::Straight => write!(f, "STRAIGHT"),
            SegmentType::Curve => write!(f, "CURVE"),
        }
    }
}

/// Curve direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveDirection {
    Left,
    Right,
    #[default]
    None,
}

impl fmt::Display for CurveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveDirection::Left => write!(f, "left"),
            CurveDirection::Right => write!(f, "right"),
            CurveDirection::None => write!(f, "none"),
        }
    }
}

/// One classified sample of the live vehicle state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Simulation time (ms)
    pub time_ms: f64,
    pub position: GeoPoint,
    /// Forward bearing (°), known once two fixes have been seen
    pub heading_deg: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub yaw_rate_dps: f64,
    pub long_accel: Option<f64>,
    pub lat_accel: Option<f64>,
}

/// Segment still collecting samples
#[derive(Debug, Clone)]
pub struct OpenSegment {
    segment_type: SegmentType,
    start_time_ms: f64,
    start_position: GeoPoint,
    direction: CurveDirection,
    path: Vec<GeoPoint>,
    headings: Vec<f64>,
    speeds: Vec<f64>,
    yaw_rates: Vec<f64>,
    long_accels: Vec<f64>,
    lat_accels: Vec<f64>,
}

impl OpenSegment {
    /// Open a segment at `tick`, recording its samples
    pub fn open(segment_type: SegmentType, tick: &Tick) -> Self {
        let mut segment = Self {
            segment_type,
            start_time_ms: tick.time_ms,
            start_position: tick.position,
            direction: CurveDirection::None,
            path: Vec::new(),
            headings: Vec::new(),
            speeds: Vec::new(),
            yaw_rates: Vec::new(),
            long_accels: Vec::new(),
            lat_accels: Vec::new(),
        };
        segment.record(tick);
        segment
    }

    /// Append one tick's samples
    pub fn record(&mut self, tick: &Tick) {
        self.path.push(tick.position);
        self.headings.extend(tick.heading_deg);
        self.yaw_rates.push(tick.yaw_rate_dps);

        if let Some(speed) = tick.speed_kmh {
            self.speeds.push(speed);
        }

        match self.segment_type {
            SegmentType::Straight => self.long_accels.extend(tick.long_accel),
            SegmentType::Curve => self.lat_accels.extend(tick.lat_accel),
        }
    }

    /// Direction reported by the classifier
    pub fn set_direction(&mut self, direction: CurveDirection) {
        if self.segment_type == SegmentType::Curve && direction != CurveDirection::None {
            self.direction = direction;
        }
    }

    pub fn segment_type(&self) -> SegmentType {
        self.segment_type
    }

    /// Close the segment and compute its summary
    pub fn finalize(
        mut self,
        end_time_ms: f64,
        end_position: GeoPoint,
        end_heading: Option<f64>,
    ) -> Segment {
        self.path.push(end_position);
        self.headings.extend(end_heading);

        let (min_speed, max_speed, average_speed) =
            min_max_mean(&self.speeds).unwrap_or_default();
        let abs_yaw: Vec<f64> = self.yaw_rates.iter().map(|y| y.abs()).collect();
        let (_, max_yaw, average_yaw) = min_max_mean(&abs_yaw).unwrap_or_default();
        let long = min_max_mean(&self.long_accels);
        let lat = min_max_mean(&self.lat_accels);

        let duration_s = (end_time_ms - self.start_time_ms) / 1000.0;

        let (length_m, curve_degrees, direction, average_yaw_rate_dps, max_yaw_rate_dps) =
            match self.segment_type {
                SegmentType::Straight => {
                    (straight_length(&self.path), 0.0, CurveDirection::None, 0.0, 0.0)
                }
                SegmentType::Curve => {
                    let mut degrees = heading_change(&self.headings);
                    if degrees < MIN_HEADING_CHANGE_DEG && duration_s > 0.0 {
                        degrees = average_yaw * duration_s;
                    }
                    let direction = match self.direction {
                        CurveDirection::None => majority_direction(&self.yaw_rates),
                        known => known,
                    };
                    (0.0, degrees, direction, average_yaw, max_yaw)
                }
            };

        Segment {
            segment_type: self.segment_type,
            start_time_ms: self.start_time_ms,
            end_time_ms,
            start_position: self.start_position,
            end_position,
            average_speed_kmh: average_speed,
            max_speed_kmh: max_speed,
            min_speed_kmh: min_speed,
            length_m,
            max_long_accel: long.map(|(_, max, _)| max),
            min_long_accel: long.map(|(min, _, _)| min),
            direction,
            curve_degrees,
            average_yaw_rate_dps,
            max_yaw_rate_dps,
            max_lat_accel: lat.map(|(_, max, _)| max),
            min_lat_accel: lat.map(|(min, _, _)| min),
            path: self.path,
            headings: self.headings,
        }
    }
}

/// Closed segment summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_type: SegmentType,
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub start_position: GeoPoint,
    pub end_position: GeoPoint,

    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub min_speed_kmh: f64,

    /// Path length (straights only)
    pub length_m: f64,
    pub max_long_accel: Option<f64>,
    pub min_long_accel: Option<f64>,

    pub direction: CurveDirection,
    /// Total heading change (curves only)
    pub curve_degrees: f64,
    pub average_yaw_rate_dps: f64,
    pub max_yaw_rate_dps: f64,
    pub max_lat_accel: Option<f64>,
    pub min_lat_accel: Option<f64>,

    /// GPS path including start and end
    pub path: Vec<GeoPoint>,
    /// Heading samples, from the first tick with a known bearing to the end
    pub headings: Vec<f64>,
}

impl Segment {
    pub fn duration_ms(&self) -> f64 {
        self.end_time_ms - self.start_time_ms
    }

    pub fn is_curve(&self) -> bool {
        self.segment_type == SegmentType::Curve
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.0}-{:.0} ms, avg {:.1} km/h (min {:.1}, max {:.1})",
            self.segment_type,
            self.start_time_ms,
            self.end_time_ms,
            self.average_speed_kmh,
            self.min_speed_kmh,
            self.max_speed_kmh
        )?;
        match self.segment_type {
            SegmentType::Straight => write!(f, ", length {:.1} m", self.length_m),
            SegmentType::Curve => write!(
                f,
                ", {} {:.1}°, yaw avg {:.2} max {:.2} °/s",
                self.direction,
                self.curve_degrees,
                self.average_yaw_rate_dps,
                self.max_yaw_rate_dps
            ),
        }
    }
}

fn min_max_mean(values: &[f64]) -> Option<(f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((min, max, mean))
}

/// Sum of hops for paths longer than two points, direct distance for two
fn straight_length(path: &[GeoPoint]) -> f64 {
    match path {
        [] | [_] => 0.0,
        [start, end] => haversine_m(*start, *end),
        _ => path.windows(2).map(|w| haversine_m(w[0], w[1])).sum(),
    }
}

/// Larger of the net and the accumulated heading change
fn heading_change(headings: &[f64]) -> f64 {
    let (Some(first), Some(last)) = (headings.first(), headings.last()) else {
        return 0.0;
    };
    let net = normalize_delta(last - first).abs();
    let accumulated: f64 = headings
        .windows(2)
        .map(|w| normalize_delta(w[1] - w[0]).abs())
        .sum();

    net.max(accumulated)
}

fn majority_direction(yaw_rates: &[f64]) -> CurveDirection {
    let positive = yaw_rates.iter().filter(|&&y| y > 0.0).count();
    let negative = yaw_rates.iter().filter(|&&y| y < 0.0).count();
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => CurveDirection::Right,
        std::cmp::Ordering::Less => CurveDirection::Left,
        std::cmp::Ordering::Equal => CurveDirection::None,
    }
}
