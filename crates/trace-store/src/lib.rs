//! Trace Store
//!
//! Holds decoded CAN frames and GPS fixes in file order and hands them out
//! through a resettable forward cursor.

mod error;
mod loader;
mod trace;

pub use error::TraceError;
pub use loader::{
    load_can_trace, load_gps_trace, parse_can_line, parse_can_trace, parse_gps_trace, LoadReport,
};
pub use trace::Trace;

use can_protocol::{CanFrame, GpsFix};

/// Ordered CAN frames from a trace file
pub type CanTrace = Trace<CanFrame>;

/// Ordered GPS fixes from a trace file
pub type GpsTrace = Trace<GpsFix>;
