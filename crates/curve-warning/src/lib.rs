//! Curve Warning Assist
//!
//! Looks up the nearest not-yet-reached segment in a recorded library and
//! produces a distance-banded advisory for the driver.

mod assist;

pub use assist::{Advisory, CurveWarningAssist, UpcomingSegment, WarningBand, WarningConfig};
