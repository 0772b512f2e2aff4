//! CAN Trace Protocol
//!
//! Decodes the three CAN messages carried by recorded vehicle traces into
//! physically scaled measurements, and defines the line-oriented text protocol
//! used to stream CAN frames and GPS fixes from the replay server to clients.

mod error;
mod frame;
mod gps;
mod wire;

pub use error::{DecodeError, WireError};
pub use frame::{decode_payload, is_known_id, offset_duration, CanFrame, CanSignal};
pub use gps::GpsFix;
pub use wire::{encode_fix, encode_frame, extract_labeled, WireMessage, WireReading};

/// Known CAN message identifiers
pub mod ids {
    /// Steering wheel angle
    pub const STEERING: &str = "0018";
    /// Vehicle speed
    pub const SPEED: &str = "0F7A";
    /// Yaw rate and longitudinal/lateral acceleration
    pub const DYNAMICS: &str = "0B41";
}

/// Control lines exchanged outside of the data stream
pub mod control {
    /// Sent by the client once connected
    pub const START: &str = "START";
    /// Sent by the server after the last event of a session
    pub const SIMULATION_COMPLETE: &str = "SIMULATION_COMPLETE";
}
