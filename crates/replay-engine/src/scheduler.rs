//! Merged Event Stream and Replay Pacing

use can_protocol::{encode_fix, encode_frame, offset_duration, CanFrame, GpsFix};
use std::time::{Duration, Instant};
use trace_store::{CanTrace, GpsTrace};

/// One event of the merged replay stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayEvent {
    Can(CanFrame),
    Gps(GpsFix),
}

impl ReplayEvent {
    /// Offset from the session anchor (ms)
    pub fn offset_ms(&self) -> f64 {
        match self {
            ReplayEvent::Can(frame) => frame.timestamp_ms,
            ReplayEvent::Gps(fix) => fix.time_offset_ms,
        }
    }

    /// Wire line for this event (no trailing newline)
    pub fn to_line(&self) -> String {
        match self {
            ReplayEvent::Can(frame) => encode_frame(frame),
            ReplayEvent::Gps(fix) => encode_fix(fix),
        }
    }
}

/// Merges the CAN and GPS traces into one stream ordered by offset.
///
/// When a GPS fix and a CAN frame share an offset, the GPS fix goes first.
pub struct MergedStream {
    can: CanTrace,
    gps: GpsTrace,
}

impl MergedStream {
    /// Create a stream over both traces, starting from their first records
    pub fn new(mut can: CanTrace, mut gps: GpsTrace) -> Self {
        can.reset();
        gps.reset();
        Self { can, gps }
    }

    /// Events not yet emitted
    pub fn remaining(&self) -> usize {
        self.can.remaining() + self.gps.remaining()
    }
}

impl Iterator for MergedStream {
    type Item = ReplayEvent;

    fn next(&mut self) -> Option<ReplayEvent> {
        let can_offset = self.can.peek().map(|frame| frame.timestamp_ms);
        let gps_offset = self.gps.peek().map(|fix| fix.time_offset_ms);

        let take_gps = match (can_offset, gps_offset) {
            (None, None) => return None,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some(can), Some(gps)) => gps <= can,
        };

        if take_gps {
            self.gps.next().copied().map(ReplayEvent::Gps)
        } else {
            self.can.next().copied().map(ReplayEvent::Can)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

/// Paces delivery against a monotonic anchor taken at session start
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    /// Session start
    anchor: Instant,
    /// Final stretch before a target spent yielding instead of sleeping
    spin_window: Duration,
}

impl Pacer {
    /// Anchor a new pacer at the current instant
    pub fn start(spin_window: Duration) -> Self {
        Self {
            anchor: Instant::now(),
            spin_window,
        }
    }

    /// Wall-clock instant at which an event with `offset_ms` is due.
    ///
    /// Offsets that cannot be represented (non-finite or out of range) are
    /// due immediately.
    pub fn target(&self, offset_ms: f64) -> Instant {
        offset_duration(offset_ms.max(0.0))
            .and_then(|offset| self.anchor.checked_add(offset))
            .unwrap_or(self.anchor)
    }

    /// Wait until the event is due and return how late it is.
    ///
    /// Never returns before the target. Timer sleeps cover most of the wait;
    /// the last `spin_window` is spent yielding to tighten the deadline.
    pub async fn wait_until(&self, offset_ms: f64) -> Duration {
        let target = self.target(offset_ms);
        let now = Instant::now();

        if target > now {
            if let Some(coarse) = target.checked_sub(self.spin_window) {
                if coarse > now {
                    tokio::time::sleep_until(coarse.into()).await;
                }
            }
            while Instant::now() < target {
                tokio::task::yield_now().await;
            }
        }

        Instant::now().saturating_duration_since(target)
    }

    /// Time since the anchor
    pub fn elapsed(&self) -> Duration {
        self.anchor.elapsed()
    }
}
