//! Straight/curve classifier with debounce

use crate::config::ClassifierConfig;
use crate::segment::{CurveDirection, SegmentType};
use std::collections::VecDeque;
use tracing::debug;

/// Fixed-capacity window over the most recent samples
#[derive(Debug, Clone)]
struct SlidingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    /// Longest run of consecutive samples strictly above `threshold`
    fn longest_run_above(&self, threshold: f64) -> usize {
        let mut longest = 0;
        let mut run = 0;
        for &value in &self.data {
            if value > threshold {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        longest
    }

    /// Samples above `+threshold` and below `-threshold` in the newest half
    fn sign_counts_recent_half(&self, threshold: f64) -> (usize, usize) {
        let half = (self.data.len() / 2).max(1);
        let skip = self.data.len().saturating_sub(half);

        self.data
            .iter()
            .skip(skip)
            .fold((0, 0), |(pos, neg), &value| {
                if value > threshold {
                    (pos + 1, neg)
                } else if value < -threshold {
                    (pos, neg + 1)
                } else {
                    (pos, neg)
                }
            })
    }
}

/// Classifies driving as straight or curve from yaw rate and steering angle.
///
/// A curve needs `min_consecutive` samples in a row above either threshold
/// within the window. State changes are debounced by `min_hold_ms`, counted
/// from the previous committed change; the very first change is never held.
#[derive(Debug, Clone)]
pub struct SegmentClassifier {
    config: ClassifierConfig,
    yaw_abs: SlidingWindow,
    steer_abs: SlidingWindow,
    yaw_signed: SlidingWindow,
    steer_signed: SlidingWindow,
    state: SegmentType,
    direction: CurveDirection,
    last_change_ms: Option<f64>,
}

impl SegmentClassifier {
    /// Create a classifier in the Straight state
    pub fn new(config: ClassifierConfig) -> Self {
        let size = config.window_size;
        Self {
            yaw_abs: SlidingWindow::new(size),
            steer_abs: SlidingWindow::new(size),
            yaw_signed: SlidingWindow::new(size),
            steer_signed: SlidingWindow::new(size),
            state: SegmentType::Straight,
            direction: CurveDirection::None,
            last_change_ms: None,
            config,
        }
    }

    /// Feed one sample and return the committed state
    pub fn update(&mut self, yaw_rate_dps: f64, steering_deg: f64, time_ms: f64) -> SegmentType {
        self.yaw_abs.push(yaw_rate_dps.abs());
        self.steer_abs.push(steering_deg.abs());
        self.yaw_signed.push(yaw_rate_dps);
        self.steer_signed.push(steering_deg);

        let candidate = self.candidate();
        if candidate != self.state {
            let hold_elapsed = self
                .last_change_ms
                .map_or(true, |last| time_ms - last >= self.config.min_hold_ms);

            if hold_elapsed {
                debug!("Segment change {} -> {} at {:.1} ms", self.state, candidate, time_ms);
                self.state = candidate;
                self.last_change_ms = Some(time_ms);
            }
        }

        self.direction = match self.state {
            SegmentType::Curve => self.infer_direction(),
            SegmentType::Straight => CurveDirection::None,
        };

        self.state
    }

    /// Committed state
    pub fn state(&self) -> SegmentType {
        self.state
    }

    /// Curve direction (None while straight or undecided)
    pub fn direction(&self) -> CurveDirection {
        self.direction
    }

    /// Clear all windows and return to Straight
    pub fn reset(&mut self) {
        self.yaw_abs.clear();
        self.steer_abs.clear();
        self.yaw_signed.clear();
        self.steer_signed.clear();
        self.state = SegmentType::Straight;
        self.direction = CurveDirection::None;
        self.last_change_ms = None;
    }

    fn candidate(&self) -> SegmentType {
        let k = self.config.min_consecutive;
        let yaw_run = self.yaw_abs.longest_run_above(self.config.yaw_threshold_dps);
        let steer_run = self.steer_abs.longest_run_above(self.config.steer_threshold_deg);

        if yaw_run >= k || steer_run >= k {
            SegmentType::Curve
        } else {
            SegmentType::Straight
        }
    }

    fn infer_direction(&self) -> CurveDirection {
        // Positive yaw rate turns right; steering only breaks yaw ties
        let (yaw_pos, yaw_neg) = self
            .yaw_signed
            .sign_counts_recent_half(self.config.yaw_threshold_dps);
        if yaw_pos != yaw_neg {
            return if yaw_pos > yaw_neg {
                CurveDirection::Right
            } else {
                CurveDirection::Left
            };
        }

        let (steer_pos, steer_neg) = self
            .steer_signed
            .sign_counts_recent_half(self.config.steer_threshold_deg);
        match steer_pos.cmp(&steer_neg) {
            std::cmp::Ordering::Greater => CurveDirection::Right,
            std::cmp::Ordering::Less => CurveDirection::Left,
            std::cmp::Ordering::Equal => CurveDirection::None,
        }
    }
}

impl Default for SegmentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
