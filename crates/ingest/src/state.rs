//! Live sensor snapshot

use can_protocol::{WireMessage, WireReading};
use segmentation::{bearing_deg, GeoPoint, Tick};

/// Latest known value of every signal.
///
/// Readings that fail to parse leave the previous value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSensorState {
    /// Timestamp of the latest data message (ms)
    pub sim_time_ms: f64,
    pub speed_kmh: Option<f64>,
    pub steering_deg: Option<f64>,
    pub yaw_rate_dps: Option<f64>,
    pub long_accel: Option<f64>,
    pub lat_accel: Option<f64>,
    pub position: Option<GeoPoint>,
    previous_position: Option<GeoPoint>,
    /// Bearing between the two most recent fixes (°), unknown until the second fix
    pub heading_deg: Option<f64>,
    /// Data messages applied
    pub updates: u64,
}

impl LiveSensorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a parsed message; returns false for control messages
    pub fn apply(&mut self, message: &WireMessage) -> bool {
        match message {
            WireMessage::Start | WireMessage::Complete => return false,
            WireMessage::Can {
                timestamp_ms,
                reading,
                ..
            } => {
                self.sim_time_ms = *timestamp_ms;
                self.apply_reading(reading);
            }
            WireMessage::Gps {
                timestamp_ms,
                position,
            } => {
                self.sim_time_ms = *timestamp_ms;
                if let Some((latitude, longitude)) = position {
                    self.apply_fix(GeoPoint::new(*latitude, *longitude));
                }
            }
        }
        self.updates += 1;
        true
    }

    fn apply_reading(&mut self, reading: &WireReading) {
        match *reading {
            WireReading::Steering(angle) => keep_latest(&mut self.steering_deg, angle),
            WireReading::Speed(speed) => keep_latest(&mut self.speed_kmh, speed),
            WireReading::Dynamics {
                yaw_rate_dps,
                long_accel,
                lat_accel,
            } => {
                keep_latest(&mut self.yaw_rate_dps, yaw_rate_dps);
                keep_latest(&mut self.long_accel, long_accel);
                keep_latest(&mut self.lat_accel, lat_accel);
            }
        }
    }

    fn apply_fix(&mut self, fix: GeoPoint) {
        self.previous_position = self.position.replace(fix);
        if let Some(previous) = self.previous_position {
            self.heading_deg = Some(bearing_deg(previous, fix));
        }
    }

    /// Steering, yaw rate and position are all known
    pub fn is_ready(&self) -> bool {
        self.steering_deg.is_some() && self.yaw_rate_dps.is_some() && self.position.is_some()
    }

    /// Snapshot for the segment aggregator, once ready
    pub fn tick(&self) -> Option<Tick> {
        if !self.is_ready() {
            return None;
        }
        Some(Tick {
            time_ms: self.sim_time_ms,
            position: self.position?,
            heading_deg: self.heading_deg,
            speed_kmh: self.speed_kmh,
            yaw_rate_dps: self.yaw_rate_dps?,
            long_accel: self.long_accel,
            lat_accel: self.lat_accel,
        })
    }
}

fn keep_latest(slot: &mut Option<f64>, value: Option<f64>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> WireMessage {
        WireMessage::parse(line).unwrap()
    }

    #[test]
    fn test_apply_can_readings() {
        let mut state = LiveSensorState::new();
        state.apply(&parse(
            "CAN|0018|12.5|STEERING|SteeringWheelAngleFrame [ID=0018, Time=12.5, Angle=-20.5°]",
        ));
        state.apply(&parse(
            "CAN|0F7A|13.0|SPEED|VehicleSpeedFrame [ID=0F7A, Time=13.0, Speed=45.0 km/h]",
        ));
        state.apply(&parse("CAN|0B41|14.0|DYNAMICS|3.5|0.8|-1.2"));

        assert_eq!(state.steering_deg, Some(-20.5));
        assert_eq!(state.speed_kmh, Some(45.0));
        assert_eq!(state.yaw_rate_dps, Some(3.5));
        assert_eq!(state.long_accel, Some(0.8));
        assert_eq!(state.lat_accel, Some(-1.2));
        assert_eq!(state.sim_time_ms, 14.0);
        assert_eq!(state.updates, 3);
    }

    #[test]
    fn test_bad_field_keeps_previous_value() {
        let mut state = LiveSensorState::new();
        state.apply(&parse("CAN|0B41|1.0|DYNAMICS|3.5|0.8|-1.2"));
        state.apply(&parse("CAN|0B41|2.0|DYNAMICS|oops|0.9|-1.0"));

        assert_eq!(state.yaw_rate_dps, Some(3.5));
        assert_eq!(state.long_accel, Some(0.9));
        assert_eq!(state.sim_time_ms, 2.0);
    }

    #[test]
    fn test_heading_from_last_two_fixes() {
        let mut state = LiveSensorState::new();
        state.apply(&parse("GPS|0.0|48.000000|11.000000"));
        assert_eq!(state.heading_deg, None);

        state.apply(&parse("GPS|1000.0|48.000000|11.001000"));
        assert!((state.heading_deg.unwrap() - 90.0).abs() < 0.01);

        state.apply(&parse("GPS|2000.0|47.999000|11.001000"));
        assert!((state.heading_deg.unwrap() - 180.0).abs() < 0.01);
    }

    #[test]
    fn test_tick_before_second_fix_has_no_heading() {
        let mut state = LiveSensorState::new();
        state.apply(&parse("GPS|0.0|48.000000|11.000000"));
        state.apply(&parse("CAN|0B41|0.5|DYNAMICS|-6.0|0.0|0.0"));
        state.apply(&parse(
            "CAN|0018|0.6|STEERING|SteeringWheelAngleFrame [ID=0018, Time=0.6, Angle=-40.0°]",
        ));
        assert_eq!(state.tick().unwrap().heading_deg, None);

        // Due west
        state.apply(&parse("GPS|1000.0|48.000000|10.999000"));
        let heading = state.tick().unwrap().heading_deg.unwrap();
        assert!((heading - 270.0).abs() < 0.01);
    }

    #[test]
    fn test_ready_only_with_steering_yaw_and_gps() {
        let mut state = LiveSensorState::new();
        assert!(state.tick().is_none());

        state.apply(&parse("GPS|0.0|48.000000|11.000000"));
        state.apply(&parse("CAN|0B41|0.5|DYNAMICS|1.0|0.0|0.0"));
        assert!(!state.is_ready());

        state.apply(&parse(
            "CAN|0018|0.6|STEERING|SteeringWheelAngleFrame [ID=0018, Time=0.6, Angle=2.0°]",
        ));
        let tick = state.tick().unwrap();
        assert_eq!(tick.time_ms, 0.6);
        assert_eq!(tick.yaw_rate_dps, 1.0);
        assert_eq!(tick.speed_kmh, None);
    }

    #[test]
    fn test_control_messages_ignored() {
        let mut state = LiveSensorState::new();
        assert!(!state.apply(&WireMessage::Start));
        assert!(!state.apply(&WireMessage::Complete));
        assert_eq!(state.updates, 0);
    }
}
