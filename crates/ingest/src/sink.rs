//! Presentation sinks
//!
//! Sinks are called synchronously from the processor and must not block.

use crate::pipeline::RunReport;
use crate::state::LiveSensorState;
use curve_warning::Advisory;
use segmentation::{Segment, SegmentType};
use tracing::{debug, info};

/// Receives pipeline updates for display
pub trait SessionSink: Send {
    /// Called after every applied data message
    fn on_update(
        &mut self,
        state: &LiveSensorState,
        segment: Option<SegmentType>,
        advisory: Option<&Advisory>,
    );

    /// Called when a segment closes
    fn on_segment_closed(&mut self, _segment: &Segment) {}

    /// Called once after the session ends
    fn on_complete(&mut self, _report: &RunReport) {}
}

/// Writes updates to the tracing log
#[derive(Debug, Default)]
pub struct TracingSink {
    last_advisory: Option<String>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSink for TracingSink {
    fn on_update(
        &mut self,
        state: &LiveSensorState,
        segment: Option<SegmentType>,
        advisory: Option<&Advisory>,
    ) {
        debug!(
            "t={:.1}ms speed={} steer={} yaw={} lat={} long={} segment={}",
            state.sim_time_ms,
            fmt_value(state.speed_kmh),
            fmt_value(state.steering_deg),
            fmt_value(state.yaw_rate_dps),
            fmt_value(state.lat_accel),
            fmt_value(state.long_accel),
            segment.map_or_else(|| "-".to_string(), |s| s.to_string())
        );

        // Only log advisories when the text changes
        if let Some(advisory) = advisory {
            let text = advisory.to_string();
            if self.last_advisory.as_deref() != Some(text.as_str()) {
                info!("{}", text);
                self.last_advisory = Some(text);
            }
        }
    }

    fn on_complete(&mut self, report: &RunReport) {
        info!(
            "Session finished: {} processed, {} dropped, {} parse errors, {} segments",
            report.stats.processed, report.stats.dropped, report.stats.parse_errors, report.segments
        );
    }
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}
