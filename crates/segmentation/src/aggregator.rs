//! Segment geometry aggregation
//!
//! Turns the classifier's committed state into a sequence of closed
//! segments stored in a [`SegmentLibrary`].

use crate::geo::GeoPoint;
use crate::library::SegmentLibrary;
use crate::segment::{CurveDirection, OpenSegment, Segment, SegmentType, Tick};
use tracing::info;

/// Opens, feeds, and closes segments as the classification changes
#[derive(Debug, Default)]
pub struct SegmentAggregator {
    current: Option<OpenSegment>,
    library: SegmentLibrary,
}

impl SegmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one classified tick.
    ///
    /// Returns the segment closed by a type change, if any.
    pub fn observe(
        &mut self,
        segment_type: SegmentType,
        direction: CurveDirection,
        tick: &Tick,
    ) -> Option<&Segment> {
        let mut closed = false;

        let mut open = match self.current.take() {
            Some(mut open) if open.segment_type() == segment_type => {
                open.record(tick);
                open
            }
            Some(previous) => {
                self.close(previous, tick.time_ms, tick.position, tick.heading_deg);
                closed = true;
                OpenSegment::open(segment_type, tick)
            }
            None => OpenSegment::open(segment_type, tick),
        };
        open.set_direction(direction);
        self.current = Some(open);

        if closed {
            self.library.last()
        } else {
            None
        }
    }

    /// Close the open segment, if any, at the given end point
    pub fn finish(
        &mut self,
        end_time_ms: f64,
        end_position: GeoPoint,
        end_heading: Option<f64>,
    ) -> Option<&Segment> {
        let open = self.current.take()?;
        self.close(open, end_time_ms, end_position, end_heading);
        self.library.last()
    }

    /// Type of the segment being collected
    pub fn current_type(&self) -> Option<SegmentType> {
        self.current.as_ref().map(OpenSegment::segment_type)
    }

    /// Segments closed so far
    pub fn library(&self) -> &SegmentLibrary {
        &self.library
    }

    /// Hand over the recorded library, discarding any open segment
    pub fn into_library(self) -> SegmentLibrary {
        self.library
    }

    fn close(
        &mut self,
        open: OpenSegment,
        end_time_ms: f64,
        end_position: GeoPoint,
        end_heading: Option<f64>,
    ) {
        let segment = open.finalize(end_time_ms, end_position, end_heading);
        info!("Segment #{} closed: {}", self.library.len() + 1, segment);
        self.library.push(segment);
    }
}
