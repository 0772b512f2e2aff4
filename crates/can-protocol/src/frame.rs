//! CAN Frame Definitions and Payload Decoding
//!
//! Each known identifier carries a fixed-point encoding; the scale and offset
//! constants below reproduce the sensor specification exactly.

use crate::error::DecodeError;
use crate::ids;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Decoded measurement carried by a CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CanSignal {
    /// Steering wheel angle (0x0018)
    Steering { angle_deg: f64 },
    /// Vehicle speed (0x0F7A)
    Speed { kmh: f64 },
    /// Yaw rate and accelerations (0x0B41)
    Dynamics {
        yaw_rate_dps: f64,
        long_accel: f64,
        lat_accel: f64,
    },
}

impl CanSignal {
    /// Decode an 8-byte payload for the given identifier
    pub fn decode(id: &str, bytes: &[u8; 8]) -> Result<Self, DecodeError> {
        if id.eq_ignore_ascii_case(ids::STEERING) {
            // 14-bit raw, 0.5°/bit, offset -2048°
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x3FFF;
            Ok(CanSignal::Steering {
                angle_deg: raw as f64 * 0.5 - 2048.0,
            })
        } else if id.eq_ignore_ascii_case(ids::SPEED) {
            // 12-bit raw, 0.1 km/h per bit
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x0FFF;
            Ok(CanSignal::Speed {
                kmh: raw as f64 * 0.1,
            })
        } else if id.eq_ignore_ascii_case(ids::DYNAMICS) {
            let yaw_raw = u16::from_be_bytes([bytes[0], bytes[1]]);
            Ok(CanSignal::Dynamics {
                yaw_rate_dps: yaw_raw as f64 * 0.01 - 327.68,
                long_accel: bytes[4] as f64 * 0.08 - 10.24,
                lat_accel: bytes[5] as f64 * 0.08 - 10.24,
            })
        } else {
            Err(DecodeError::Unrecognized(id.to_string()))
        }
    }

    /// Identifier of the message carrying this signal
    pub fn id(&self) -> &'static str {
        match self {
            CanSignal::Steering { .. } => ids::STEERING,
            CanSignal::Speed { .. } => ids::SPEED,
            CanSignal::Dynamics { .. } => ids::DYNAMICS,
        }
    }

    /// Wire kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            CanSignal::Steering { .. } => "STEERING",
            CanSignal::Speed { .. } => "SPEED",
            CanSignal::Dynamics { .. } => "DYNAMICS",
        }
    }
}

/// A decoded CAN frame with its trace timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Offset from the start of the trace (ms)
    pub timestamp_ms: f64,
    /// Decoded measurement
    pub signal: CanSignal,
}

impl CanFrame {
    /// Decode a frame from its identifier and 16-character hex payload
    pub fn decode(id: &str, payload_hex: &str, timestamp_ms: f64) -> Result<Self, DecodeError> {
        if !is_known_id(id) {
            return Err(DecodeError::Unrecognized(id.to_string()));
        }
        let bytes = decode_payload(payload_hex)?;
        Ok(Self {
            timestamp_ms,
            signal: CanSignal::decode(id, &bytes)?,
        })
    }

    /// 4-hex-character identifier
    pub fn id(&self) -> &'static str {
        self.signal.id()
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal {
            CanSignal::Steering { angle_deg } => write!(
                f,
                "SteeringWheelAngleFrame [ID={}, Time={}, Angle={}°]",
                self.id(),
                self.timestamp_ms,
                angle_deg
            ),
            CanSignal::Speed { kmh } => write!(
                f,
                "VehicleSpeedFrame [ID={}, Time={}, Speed={} km/h]",
                self.id(),
                self.timestamp_ms,
                kmh
            ),
            CanSignal::Dynamics {
                yaw_rate_dps,
                long_accel,
                lat_accel,
            } => write!(
                f,
                "VehicleDynamicsFrame [ID={}, Time={}, Lat Accel={}, Long Accel={}, Yaw Rate={}]",
                self.id(),
                self.timestamp_ms,
                lat_accel,
                long_accel,
                yaw_rate_dps
            ),
        }
    }
}

/// Trace offset as a `Duration`.
///
/// `None` unless the offset is finite, non-negative and fits a `Duration`.
pub fn offset_duration(timestamp_ms: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(timestamp_ms / 1000.0).ok()
}

/// Check whether an identifier is one of the decoded messages
pub fn is_known_id(id: &str) -> bool {
    [ids::STEERING, ids::SPEED, ids::DYNAMICS]
        .iter()
        .any(|known| id.eq_ignore_ascii_case(known))
}

/// Convert a 16-character hex string into 8 payload bytes
pub fn decode_payload(payload_hex: &str) -> Result<[u8; 8], DecodeError> {
    let raw = payload_hex.as_bytes();
    if raw.len() != 16 {
        return Err(DecodeError::InvalidLength(raw.len()));
    }

    let mut bytes = [0u8; 8];
    for (i, pair) in raw.chunks(2).enumerate() {
        match (nibble(pair[0]), nibble(pair[1])) {
            (Some(hi), Some(lo)) => bytes[i] = (hi << 4) | lo,
            _ => return Err(DecodeError::InvalidHex(payload_hex.to_string())),
        }
    }
    Ok(bytes)
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
