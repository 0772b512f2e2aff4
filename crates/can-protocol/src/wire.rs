//! Replay Wire Protocol
//!
//! Newline-terminated, pipe-delimited ASCII lines:
//!
//! ```text
//! CAN|<id>|<timestamp_ms>|STEERING|<frame text with Angle=<v>°>
//! CAN|<id>|<timestamp_ms>|SPEED|<frame text with Speed=<v> km/h>
//! CAN|<id>|<timestamp_ms>|DYNAMICS|<yaw>|<long_accel>|<lat_accel>
//! GPS|<timestamp_ms>|<latitude>|<longitude>
//! ```
//!
//! Structural fields (tag, kind, timestamp) are strict. Measurement fields are
//! lenient: a value that fails to parse is reported as `None` so the consumer
//! can keep its previous reading.

use crate::control;
use crate::error::WireError;
use crate::frame::{offset_duration, CanFrame, CanSignal};
use crate::gps::GpsFix;

/// Measurement carried by a CAN wire line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireReading {
    Steering(Option<f64>),
    Speed(Option<f64>),
    Dynamics {
        yaw_rate_dps: Option<f64>,
        long_accel: Option<f64>,
        lat_accel: Option<f64>,
    },
}

/// A parsed wire line
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Client handshake
    Start,
    /// End-of-session sentinel
    Complete,
    /// CAN measurement
    Can {
        id: String,
        timestamp_ms: f64,
        reading: WireReading,
    },
    /// GPS position; `None` if either coordinate failed to parse
    Gps {
        timestamp_ms: f64,
        position: Option<(f64, f64)>,
    },
}

impl WireMessage {
    /// Parse a single line (without its trailing newline)
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line == control::START {
            return Ok(WireMessage::Start);
        }
        if line == control::SIMULATION_COMPLETE {
            return Ok(WireMessage::Complete);
        }

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 2 {
            return Err(WireError::Truncated(line.to_string()));
        }

        match parts[0].trim() {
            "CAN" => Self::parse_can(line, &parts),
            "GPS" => Self::parse_gps(line, &parts),
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }

    fn parse_can(line: &str, parts: &[&str]) -> Result<Self, WireError> {
        if parts.len() < 4 {
            return Err(WireError::Truncated(line.to_string()));
        }
        let timestamp_ms = parse_timestamp(parts[2])?;

        let reading = match parts[3] {
            "STEERING" => WireReading::Steering(
                parts
                    .get(4)
                    .and_then(|text| extract_labeled(text, "Angle=", "°")),
            ),
            "SPEED" => WireReading::Speed(
                parts
                    .get(4)
                    .and_then(|text| extract_labeled(text, "Speed=", " km/h")),
            ),
            "DYNAMICS" if parts.len() > 6 => WireReading::Dynamics {
                yaw_rate_dps: parse_field(parts[4]),
                long_accel: parse_field(parts[5]),
                lat_accel: parse_field(parts[6]),
            },
            "DYNAMICS" => WireReading::Dynamics {
                yaw_rate_dps: None,
                long_accel: None,
                lat_accel: None,
            },
            other => return Err(WireError::UnknownKind(other.to_string())),
        };

        Ok(WireMessage::Can {
            id: parts[1].to_string(),
            timestamp_ms,
            reading,
        })
    }

    fn parse_gps(line: &str, parts: &[&str]) -> Result<Self, WireError> {
        if parts.len() < 4 {
            return Err(WireError::Truncated(line.to_string()));
        }
        let timestamp_ms = parse_timestamp(parts[1])?;
        let position = match (parse_field(parts[2]), parse_field(parts[3])) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        Ok(WireMessage::Gps {
            timestamp_ms,
            position,
        })
    }

    /// Simulation time carried by a data line
    pub fn timestamp_ms(&self) -> Option<f64> {
        match self {
            WireMessage::Can { timestamp_ms, .. } | WireMessage::Gps { timestamp_ms, .. } => {
                Some(*timestamp_ms)
            }
            _ => None,
        }
    }
}

/// Serialize a CAN frame as a wire line (no trailing newline)
pub fn encode_frame(frame: &CanFrame) -> String {
    match frame.signal {
        CanSignal::Dynamics {
            yaw_rate_dps,
            long_accel,
            lat_accel,
        } => format!(
            "CAN|{}|{}|DYNAMICS|{}|{}|{}",
            frame.id(),
            frame.timestamp_ms,
            yaw_rate_dps,
            long_accel,
            lat_accel
        ),
        _ => format!(
            "CAN|{}|{}|{}|{}",
            frame.id(),
            frame.timestamp_ms,
            frame.signal.kind(),
            frame
        ),
    }
}

/// Serialize a GPS fix as a wire line (no trailing newline)
pub fn encode_fix(fix: &GpsFix) -> String {
    format!(
        "GPS|{:.1}|{:.6}|{:.6}",
        fix.time_offset_ms, fix.latitude, fix.longitude
    )
}

/// Extract the number between `prefix` and the next `suffix` in `input`
pub fn extract_labeled(input: &str, prefix: &str, suffix: &str) -> Option<f64> {
    let start = input.find(prefix)? + prefix.len();
    let end = start + input[start..].find(suffix)?;
    input[start..end].trim().parse().ok()
}

fn parse_timestamp(field: &str) -> Result<f64, WireError> {
    field
        .trim()
        .parse()
        .ok()
        .filter(|&ms| offset_duration(ms).is_some())
        .ok_or_else(|| WireError::InvalidTimestamp(field.to_string()))
}

fn parse_field(field: &str) -> Option<f64> {
    field.trim().parse().ok()
}
